//! In-memory source for tests, replays and offline runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    models::{bar::BarSeries, period::Period},
    providers::{
        MarketDataSource, ProviderError, csv_file::clip_to_period, finish_series,
        normalize_ticker,
    },
};

/// Serves pre-loaded series keyed by normalized ticker.
///
/// Periods are resolved against `as_of`, or the newest bar of each series when unset.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    series: HashMap<String, BarSeries>,
    as_of: Option<NaiveDate>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: BarSeries) -> Self {
        self.insert(series);
        self
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Adds or replaces the series for its symbol.
    pub fn insert(&mut self, series: BarSeries) {
        let key = series.symbol.trim().to_uppercase();
        self.series.insert(key, series);
    }
}

#[async_trait]
impl MarketDataSource for StaticSource {
    async fn fetch(&self, ticker: &str, period: Period) -> Result<BarSeries, ProviderError> {
        let symbol = normalize_ticker(ticker)?;
        let bars = self
            .series
            .get(&symbol)
            .map(|s| clip_to_period(s.bars.clone(), period, self.as_of))
            .unwrap_or_default();
        finish_series(BarSeries::new(symbol, bars), period)
    }
}
