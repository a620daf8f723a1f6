//! Daily history from CSV exports on disk.
//!
//! Each ticker lives in `<dir>/<TICKER>.csv` with at least the header columns
//! `Date,Open,High,Low,Close,Volume` (extra columns such as `Adj Close` are ignored).
//! `Date` may carry a time suffix (`2024-03-08 00:00:00-05:00`); only the calendar
//! day is kept.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::{
    models::{
        bar::{Bar, BarSeries},
        period::Period,
    },
    providers::{
        CsvSnafu, InternalSnafu, MarketDataSource, MissingDirectorySnafu, ProviderError,
        ProviderInitError, ValidationSnafu, finish_series, normalize_ticker,
    },
};

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: f64,
}

/// Reads `<dir>/<TICKER>.csv`.
///
/// The period is resolved against `as_of`, which defaults to the newest row in
/// the file so that archived exports replay the same window every time.
#[derive(Debug, Clone)]
pub struct CsvSource {
    dir: PathBuf,
    as_of: Option<NaiveDate>,
}

impl CsvSource {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ProviderInitError> {
        let dir = dir.into();
        ensure!(dir.is_dir(), MissingDirectorySnafu { path: dir });
        Ok(Self { dir, as_of: None })
    }

    /// Resolves periods against a fixed day instead of the newest row.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn path_for(&self, ticker: &str) -> PathBuf {
        self.dir.join(format!("{ticker}.csv"))
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

pub(crate) fn read_bars(path: &Path) -> Result<Vec<Bar>, ProviderError> {
    let mut reader = csv::Reader::from_path(path).context(CsvSnafu { path })?;
    let mut bars = Vec::new();
    for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.context(CsvSnafu { path })?;
        let date = parse_date(&row.date).ok_or_else(|| {
            ValidationSnafu {
                message: format!(
                    "{}: row {} has unparseable date '{}'",
                    path.display(),
                    line + 1,
                    row.date
                ),
            }
            .build()
        })?;
        bars.push(Bar {
            date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }
    Ok(bars)
}

/// Keeps bars in `period.start_date(as_of)..=as_of`.
pub(crate) fn clip_to_period(bars: Vec<Bar>, period: Period, as_of: Option<NaiveDate>) -> Vec<Bar> {
    let Some(end) = as_of.or_else(|| bars.iter().map(|b| b.date).max()) else {
        return bars;
    };
    let start = period.start_date(end);
    bars.into_iter()
        .filter(|b| b.date >= start && b.date <= end)
        .collect()
}

#[async_trait]
impl MarketDataSource for CsvSource {
    async fn fetch(&self, ticker: &str, period: Period) -> Result<BarSeries, ProviderError> {
        let symbol = normalize_ticker(ticker)?;
        let path = self.path_for(&symbol);
        let as_of = self.as_of;

        let bars = tokio::task::spawn_blocking(move || read_bars(&path))
            .await
            .map_err(|e| {
                InternalSnafu {
                    message: format!("CSV reader task failed: {e}"),
                }
                .build()
            })??;
        let bars = clip_to_period(bars, period, as_of);
        debug!(ticker = %symbol, rows = bars.len(), %period, "loaded CSV history");

        finish_series(BarSeries::new(symbol, bars), period)
    }
}
