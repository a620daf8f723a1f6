//! Source abstraction for daily market data.
//!
//! This module defines the [`MarketDataSource`] trait, the single interface the
//! forecasting pipeline uses to obtain a daily OHLCV history for a ticker.
//!
//! Each concrete source (Alpaca REST, CSV exports, in-memory fixtures) implements
//! [`MarketDataSource`] and is responsible for returning a series that passes
//! [`BarSeries::validate`]. An empty history is an error ([`ProviderError::NoData`]),
//! never an empty `Ok`.
//!
//! The trait is async and object safe, so callers can pick a source at runtime:
//!
//! ```rust
//! use async_trait::async_trait;
//! use market_data_ingestor::models::{bar::BarSeries, period::Period};
//! use market_data_ingestor::providers::{MarketDataSource, ProviderError};
//!
//! struct Fixed(BarSeries);
//!
//! #[async_trait]
//! impl MarketDataSource for Fixed {
//!     async fn fetch(&self, _ticker: &str, _period: Period) -> Result<BarSeries, ProviderError> {
//!         Ok(self.0.clone())
//!     }
//! }
//! ```

pub mod alpaca_rest;
pub mod csv_file;
pub mod memory;

use std::path::PathBuf;

use async_trait::async_trait;
use snafu::{Backtrace, ResultExt, Snafu, ensure};

use crate::{
    env::MissingEnvVarError,
    models::{
        bar::{BarSeries, SeriesError},
        period::Period,
    },
};

/// Fetches the daily history of one ticker.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Returns every daily bar from `period.start_date(today)` through today,
    /// oldest first.
    async fn fetch(&self, ticker: &str, period: Period) -> Result<BarSeries, ProviderError>;
}

/// Errors that can occur during the creation of a source instance.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// Missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// Failed to build the HTTP client.
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// API key contains characters not allowed in a header.
    #[snafu(display("Invalid API key format: {source}"))]
    InvalidApiKey {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },

    /// The CSV directory does not exist.
    #[snafu(display("CSV directory not found: {}", path.display()))]
    MissingDirectory { path: PathBuf, backtrace: Backtrace },
}

/// Errors that can occur within a `MarketDataSource` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// An error during an API request (e.g., network failure, timeout).
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The provider's API returned an error response.
    #[snafu(display("API error ({status}): {message}"))]
    Api {
        status: u16,
        message: String,
        backtrace: Backtrace,
    },

    /// The request parameters were invalid for this source.
    #[snafu(display("Invalid parameters for provider: {message}"))]
    Validation {
        message: String,
        backtrace: Backtrace,
    },

    /// The source returned no rows for the ticker and period.
    #[snafu(display("No data returned for {ticker} over {period}"))]
    NoData {
        ticker: String,
        period: Period,
        backtrace: Backtrace,
    },

    /// The returned rows break the series invariants.
    #[snafu(display("Invalid series: {source}"))]
    InvalidSeries {
        source: SeriesError,
        backtrace: Backtrace,
    },

    /// A CSV file could not be read or parsed.
    #[snafu(display("Failed to read {}: {source}", path.display()))]
    Csv {
        path: PathBuf,
        source: csv::Error,
        backtrace: Backtrace,
    },

    /// A background task failed outside of the source's own logic.
    #[snafu(display("Internal source error: {message}"))]
    Internal {
        message: String,
        backtrace: Backtrace,
    },
}

/// Canonical ticker form: trimmed, upper-case, `[A-Z0-9.^-]+` with at least one
/// letter or digit and no leading `.`.
pub fn normalize_ticker(raw: &str) -> Result<String, ProviderError> {
    let ticker = raw.trim().to_uppercase();
    ensure!(
        !ticker.is_empty(),
        ValidationSnafu {
            message: "ticker cannot be empty",
        }
    );
    ensure!(
        ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^')),
        ValidationSnafu {
            message: format!("ticker '{raw}' contains unsupported characters"),
        }
    );
    // Tickers double as directory names.
    ensure!(
        !ticker.starts_with('.') && ticker.chars().any(|c| c.is_ascii_alphanumeric()),
        ValidationSnafu {
            message: format!("ticker '{raw}' must contain a letter or digit and not start with '.'"),
        }
    );
    Ok(ticker)
}

/// Orders, de-duplicates and validates a freshly assembled series.
///
/// Every source funnels its output through here so the pipeline can rely on
/// strictly increasing dates and a non-empty history.
pub(crate) fn finish_series(
    mut series: BarSeries,
    period: Period,
) -> Result<BarSeries, ProviderError> {
    series.sort_dedup();
    ensure!(
        !series.is_empty(),
        NoDataSnafu {
            ticker: series.symbol.clone(),
            period,
        }
    );
    series.validate().context(InvalidSeriesSnafu)?;
    Ok(series)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::bar::Bar;

    #[test]
    fn tickers_are_normalized() {
        assert_eq!(normalize_ticker(" aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_ticker("brk.b").unwrap(), "BRK.B");
        assert_eq!(normalize_ticker("^gspc").unwrap(), "^GSPC");
        assert!(normalize_ticker("   ").is_err());
        assert!(normalize_ticker("AA PL").is_err());
        assert!(normalize_ticker("../etc").is_err());
    }

    #[test]
    fn dot_only_tickers_are_rejected() {
        for bad in [".", "..", "...", ".hidden", "^-."] {
            assert!(
                matches!(normalize_ticker(bad), Err(ProviderError::Validation { .. })),
                "{bad}"
            );
        }
        assert_eq!(normalize_ticker("bf-b").unwrap(), "BF-B");
    }

    #[test]
    fn empty_series_is_no_data() {
        let err = finish_series(BarSeries::new("AAPL", vec![]), Period::Max).unwrap_err();
        assert!(matches!(err, ProviderError::NoData { .. }));
        assert!(err.to_string().contains("AAPL"));
    }

    #[test]
    fn finished_series_is_sorted() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let bar = |d, c| Bar {
            date: day(d),
            open: c,
            high: c,
            low: c,
            close: c,
            volume: 1.0,
        };
        let s = finish_series(
            BarSeries::new("AAPL", vec![bar(3, 3.0), bar(2, 2.0)]),
            Period::Max,
        )
        .unwrap();
        assert_eq!(s.closes(), vec![2.0, 3.0]);
    }
}
