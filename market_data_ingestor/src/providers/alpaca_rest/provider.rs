use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, header};
use secrecy::{ExposeSecret, SecretString};
use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::{
    env::require_env,
    models::{
        bar::{Bar, BarSeries},
        period::Period,
    },
    providers::{
        ApiSnafu, ClientBuildSnafu, InvalidApiKeySnafu, MarketDataSource,
        MissingEnvVarSnafu, ProviderError, ProviderInitError, ReqwestSnafu, ValidationSnafu,
        alpaca_rest::{
            params::{AlpacaBarsParams, construct_params},
            response::AlpacaResponse,
        },
        finish_series, normalize_ticker,
    },
};

const BASE_URL: &str = "https://data.alpaca.markets/v2/stocks/bars";

/// Alpaca's free plan allows 200 data requests per minute.
fn request_quota() -> Quota {
    Quota::per_minute(nonzero!(200u32))
}

pub struct AlpacaProvider {
    client: Client,
    base_url: String,
    params: AlpacaBarsParams,
    limiter: DefaultDirectRateLimiter,
    _api_key: SecretString,
    _secret_key: SecretString,
}

impl AlpacaProvider {
    /// Creates a new Alpaca provider.
    ///
    /// Reads API keys from the `APCA_API_KEY_ID` and `APCA_API_SECRET_KEY`
    /// environment variables.
    pub fn new() -> Result<Self, ProviderInitError> {
        let api_key = require_env("APCA_API_KEY_ID").context(MissingEnvVarSnafu)?;
        let secret_key = require_env("APCA_API_SECRET_KEY").context(MissingEnvVarSnafu)?;
        Self::with_credentials(
            SecretString::new(api_key.into()),
            SecretString::new(secret_key.into()),
        )
    }

    pub fn with_credentials(
        api_key: SecretString,
        secret_key: SecretString,
    ) -> Result<Self, ProviderInitError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "APCA-API-KEY-ID",
            header::HeaderValue::from_str(api_key.expose_secret()).context(InvalidApiKeySnafu)?,
        );
        headers.insert(
            "APCA-API-SECRET-KEY",
            header::HeaderValue::from_str(secret_key.expose_secret())
                .context(InvalidApiKeySnafu)?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            params: AlpacaBarsParams::default(),
            limiter: RateLimiter::direct(request_quota()),
            _api_key: api_key,
            _secret_key: secret_key,
        })
    }

    /// Overrides adjustment / feed / page size.
    pub fn with_params(mut self, params: AlpacaBarsParams) -> Self {
        self.params = params;
        self
    }

    /// Points the provider at a different endpoint (paper/sandbox or a local mock).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Fetches every daily bar for `symbol` in `start..=end`, following pagination.
    pub async fn fetch_range(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        ensure!(
            start <= end,
            ValidationSnafu {
                message: format!("start {start} is after end {end}"),
            }
        );

        let mut bars = Vec::new();
        let mut next_page_token: Option<String> = None;

        loop {
            self.limiter.until_ready().await;

            let query = construct_params(
                symbol,
                start,
                end,
                &self.params,
                next_page_token.as_deref(),
            );
            let response = self
                .client
                .get(&self.base_url)
                .query(&query)
                .send()
                .await
                .context(ReqwestSnafu)?;

            let status = response.status();
            if !status.is_success() {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown API error".to_string());
                return ApiSnafu {
                    status: status.as_u16(),
                    message,
                }
                .fail();
            }

            let page = response
                .json::<AlpacaResponse>()
                .await
                .context(ReqwestSnafu)?;

            // Alpaca keys the map by symbol even for single-symbol requests.
            let page_bars = page
                .bars
                .and_then(|mut by_symbol| by_symbol.shift_remove(symbol))
                .unwrap_or_default();
            debug!(symbol, page_len = page_bars.len(), "fetched Alpaca page");
            bars.extend(page_bars.into_iter().map(Bar::from));

            match page.next_page_token {
                Some(token) => next_page_token = Some(token),
                None => break,
            }
        }

        Ok(bars)
    }
}

#[async_trait]
impl MarketDataSource for AlpacaProvider {
    async fn fetch(&self, ticker: &str, period: Period) -> Result<BarSeries, ProviderError> {
        let symbol = normalize_ticker(ticker)?;
        let today = Utc::now().date_naive();
        let bars = self
            .fetch_range(&symbol, period.start_date(today), today)
            .await?;
        finish_series(BarSeries::new(symbol, bars), period)
    }
}
