//! Technical indicators over a daily close series.
//!
//! Key behaviors:
//! - `SMA_20` / `SMA_50` are trailing simple averages, undefined until the window is full.
//! - `EMA_12` / `EMA_26` / `MACD_Signal` use `alpha = 2 / (span + 1)` seeded with the
//!   first value (`EMA[0] = x[0]`), with no simple-average warm-up.
//! - `RSI` averages gains and losses with a 14-day trailing simple mean (not Wilder
//!   smoothing). The first day has no previous close, so its gain and loss are 0.
//!   When the average loss is 0 the RSI is 100, or 50 if the average gain is 0 too.
//! - Rows with any undefined indicator are dropped, so a frame is always dense.
//!   With the default periods that removes exactly the first 49 rows.
//!
//! Entrypoints:
//! - [`IndicatorEngine::compute`] turns a [`BarSeries`] into an [`IndicatorFrame`].
//! - [`sma`], [`ema`] and [`rsi`] are the column primitives.

use chrono::NaiveDate;
use market_data_ingestor::models::bar::BarSeries;
use serde::Serialize;
use tracing::{debug, warn};

use crate::features::{FeatureMatrix, NUM_FEATURES};

/// One dense row of a computed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub sma_20: f64,
    pub sma_50: f64,
    pub ema_12: f64,
    pub ema_26: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
}

impl IndicatorRow {
    /// Values in [`FEATURE_COLUMNS`](crate::features::FEATURE_COLUMNS) order.
    pub fn features(&self) -> [f64; NUM_FEATURES] {
        [
            self.close,
            self.volume,
            self.sma_20,
            self.sma_50,
            self.ema_12,
            self.ema_26,
            self.rsi,
            self.macd,
            self.macd_signal,
        ]
    }
}

/// A bar series extended with indicator columns, warm-up rows removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorFrame {
    pub symbol: String,
    pub rows: Vec<IndicatorRow>,
}

impl IndicatorFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn feature_matrix(&self) -> FeatureMatrix {
        let mut matrix = FeatureMatrix::zeros((self.rows.len(), NUM_FEATURES));
        for (mut out, row) in matrix.rows_mut().into_iter().zip(&self.rows) {
            for (dst, src) in out.iter_mut().zip(row.features()) {
                *dst = src;
            }
        }
        matrix
    }

    pub fn last_close(&self) -> Option<f64> {
        self.rows.last().map(|r| r.close)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    /// The last `n` rows (all of them if the frame is shorter).
    pub fn tail(&self, n: usize) -> &[IndicatorRow] {
        &self.rows[self.rows.len().saturating_sub(n)..]
    }
}

/// Indicator periods. The defaults are the ones the feature contract is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorEngine {
    pub sma_short: usize,
    pub sma_long: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub signal: usize,
    pub rsi: usize,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self {
            sma_short: 20,
            sma_long: 50,
            ema_fast: 12,
            ema_slow: 26,
            signal: 9,
            rsi: 14,
        }
    }
}

impl IndicatorEngine {
    /// Number of leading rows that can never be complete.
    pub fn warmup(&self) -> usize {
        self.sma_short
            .max(self.sma_long)
            .max(self.rsi)
            .saturating_sub(1)
    }

    /// Derives every indicator column and drops incomplete rows.
    ///
    /// Series shorter than `warmup() + 1` bars yield an empty frame; callers treat
    /// that as insufficient data.
    pub fn compute(&self, series: &BarSeries) -> IndicatorFrame {
        let closes = series.closes();

        let sma_short = sma(&closes, self.sma_short);
        let sma_long = sma(&closes, self.sma_long);
        let ema_fast = ema(&closes, self.ema_fast);
        let ema_slow = ema(&closes, self.ema_slow);
        let rsi_col = rsi(&closes, self.rsi);
        let macd: Vec<f64> = ema_fast.iter().zip(&ema_slow).map(|(f, s)| f - s).collect();
        let signal = ema(&macd, self.signal);

        let rows: Vec<IndicatorRow> = series
            .bars
            .iter()
            .enumerate()
            .filter_map(|(i, bar)| {
                Some(IndicatorRow {
                    date: bar.date,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                    sma_20: sma_short[i]?,
                    sma_50: sma_long[i]?,
                    ema_12: ema_fast[i],
                    ema_26: ema_slow[i],
                    rsi: rsi_col[i]?,
                    macd: macd[i],
                    macd_signal: signal[i],
                    macd_hist: macd[i] - signal[i],
                })
            })
            .collect();

        debug!(
            symbol = %series.symbol,
            input_rows = series.len(),
            dropped = series.len() - rows.len(),
            "computed indicators"
        );
        if rows.is_empty() && !series.is_empty() {
            warn!(
                symbol = %series.symbol,
                bars = series.len(),
                warmup = self.warmup(),
                "every row dropped during indicator warm-up"
            );
        }

        IndicatorFrame {
            symbol: series.symbol.clone(),
            rows,
        }
    }
}

/// Trailing simple average; `None` until `window` values are available.
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            (i + 1 >= window)
                .then(|| values[i + 1 - window..=i].iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Exponential moving average with `alpha = 2 / (span + 1)` and `EMA[0] = values[0]`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    for (i, &v) in values.iter().enumerate() {
        let next = if i == 0 {
            v
        } else {
            alpha * v + (1.0 - alpha) * out[i - 1]
        };
        out.push(next);
    }
    out
}

/// Relative strength index over trailing simple averages of gains and losses.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        let delta = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    let avg_gain = sma(&gains, period);
    let avg_loss = sma(&losses, period);
    avg_gain
        .into_iter()
        .zip(avg_loss)
        .map(|(g, l)| Some(rsi_value(g?, l?)))
        .collect()
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        // No losses in the window: saturate, or sit at neutral for a flat window.
        return if avg_gain > 0.0 { 100.0 } else { 50.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
