//! Maps scaled rollout output back to prices and calendar dates.
//!
//! Future dates are naive calendar-day increments from the last observed bar
//! (`last_date + 1`, `last_date + 2`, ...), so weekends and holidays are not
//! skipped.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ForecastError, Result},
    indicators::{IndicatorFrame, IndicatorRow},
    scaler::ScalingModel,
};

/// One forecast day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastStep {
    pub date: NaiveDate,
    pub scaled_value: f64,
    pub price: f64,
    /// Change versus the last observed close, in percent.
    pub change_percent: f64,
}

/// Raw OHLCV of one observed day, for charting next to a forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl From<&IndicatorRow> for HistoricalBar {
    fn from(row: &IndicatorRow) -> Self {
        Self {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

pub fn assemble(
    scaled: &[f64],
    scaler: &ScalingModel,
    target_index: usize,
    last_date: NaiveDate,
    last_price: f64,
) -> Result<Vec<ForecastStep>> {
    if last_price == 0.0 || !last_price.is_finite() {
        return Err(ForecastError::InvalidReferencePrice(last_price));
    }
    let prices = scaler.inverse_transform_feature(scaled, target_index)?;

    scaled
        .iter()
        .zip(prices)
        .enumerate()
        .map(|(i, (&scaled_value, price))| {
            let date = last_date
                .checked_add_days(Days::new(i as u64 + 1))
                .ok_or_else(|| {
                    ForecastError::ForecastConfig(format!(
                        "forecast day {} overflows the calendar after {last_date}",
                        i + 1
                    ))
                })?;
            Ok(ForecastStep {
                date,
                scaled_value,
                price,
                change_percent: (price - last_price) / last_price * 100.0,
            })
        })
        .collect()
}

/// The last `n` observed days of a frame, unchanged.
pub fn historical_window(frame: &IndicatorFrame, n: usize) -> Vec<HistoricalBar> {
    frame.tail(n).iter().map(HistoricalBar::from).collect()
}
