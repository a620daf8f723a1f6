//! Canonical in-memory representation of a daily bar (OHLCV).
//!
//! This struct is the standard output of every
//! [`MarketDataSource`](crate::providers::MarketDataSource) implementation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single daily bar.
///
/// Series are not calendar-dense: weekends and holidays are simply absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// The trading day this bar covers.
    pub date: NaiveDate,

    /// Opening price.
    pub open: f64,

    /// Highest price during the day.
    pub high: f64,

    /// Lowest price during the day.
    pub low: f64,

    /// Closing price.
    pub close: f64,

    /// Volume traded during the day.
    pub volume: f64,
}

/// Why a [`BarSeries`] was rejected by [`BarSeries::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    /// Two consecutive bars are out of order or share a date.
    #[error("bars for {symbol} are not strictly increasing at {previous} -> {current}")]
    NotIncreasing {
        symbol: String,
        previous: NaiveDate,
        current: NaiveDate,
    },

    /// A price or volume is NaN or infinite.
    #[error("bar for {symbol} on {date} has a non-finite value")]
    NonFinite { symbol: String, date: NaiveDate },
}

/// The full daily history of one symbol, oldest bar first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    /// The symbol this data represents (e.g., "AAPL").
    pub symbol: String,
    /// The collection of daily bars, strictly increasing by date.
    pub bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Closing prices in chronological order.
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Checks the ordering and finiteness invariants every source must uphold.
    pub fn validate(&self) -> Result<(), SeriesError> {
        for bar in &self.bars {
            let values = [bar.open, bar.high, bar.low, bar.close, bar.volume];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(SeriesError::NonFinite {
                    symbol: self.symbol.clone(),
                    date: bar.date,
                });
            }
        }
        for pair in self.bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(SeriesError::NotIncreasing {
                    symbol: self.symbol.clone(),
                    previous: pair[0].date,
                    current: pair[1].date,
                });
            }
        }
        Ok(())
    }

    /// Sorts by date and drops later duplicates of the same day.
    ///
    /// Sources whose upstream may page out of order call this before
    /// [`BarSeries::validate`].
    pub fn sort_dedup(&mut self) {
        self.bars.sort_by_key(|b| b.date);
        self.bars.dedup_by_key(|b| b.date);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(y: i32, m: u32, d: u32, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn weekend_gaps_are_valid() {
        // Friday then Monday.
        let s = BarSeries::new("AAPL", vec![bar(2024, 3, 8, 1.0), bar(2024, 3, 11, 2.0)]);
        assert!(s.validate().is_ok());
        assert_eq!(s.closes(), vec![1.0, 2.0]);
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let s = BarSeries::new("AAPL", vec![bar(2024, 3, 8, 1.0), bar(2024, 3, 8, 2.0)]);
        assert!(matches!(
            s.validate(),
            Err(SeriesError::NotIncreasing { .. })
        ));
    }

    #[test]
    fn nan_close_is_rejected() {
        let s = BarSeries::new("AAPL", vec![bar(2024, 3, 8, f64::NAN)]);
        assert!(matches!(s.validate(), Err(SeriesError::NonFinite { .. })));
    }

    #[test]
    fn sort_dedup_restores_order() {
        let mut s = BarSeries::new(
            "AAPL",
            vec![bar(2024, 3, 11, 2.0), bar(2024, 3, 8, 1.0), bar(2024, 3, 11, 3.0)],
        );
        s.sort_dedup();
        assert_eq!(s.closes(), vec![1.0, 2.0]);
        assert!(s.validate().is_ok());
    }
}
