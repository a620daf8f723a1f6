//! Multi-step autoregressive rollout.
//!
//! Each step predicts the next scaled target from the current window, then slides
//! the window by one row: the oldest row is dropped and a copy of the newest row
//! is appended with its target column replaced by the prediction.
//!
//! Only the target column moves. Every other feature (volume, averages, RSI, MACD)
//! stays frozen at its last observed value for the whole horizon; indicators are
//! not re-derived from synthetic closes. Prediction errors therefore compound from
//! step to step.

use ndarray::{Array2, ArrayView2, s};
use tracing::debug;

use crate::{
    error::{ForecastError, Result},
    regressor::PointRegressor,
};

/// Rolls a `[sequence_length, num_features]` seed window forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoregressiveForecaster {
    sequence_length: usize,
    num_features: usize,
    target_index: usize,
}

impl AutoregressiveForecaster {
    pub fn new(sequence_length: usize, num_features: usize, target_index: usize) -> Result<Self> {
        if sequence_length == 0 || num_features == 0 {
            return Err(ForecastError::ForecastConfig(format!(
                "window shape ({sequence_length}, {num_features}) must be non-empty"
            )));
        }
        if target_index >= num_features {
            return Err(ForecastError::ForecastConfig(format!(
                "target index {target_index} out of range for {num_features} features"
            )));
        }
        Ok(Self {
            sequence_length,
            num_features,
            target_index,
        })
    }

    fn ensure_shape(&self, window: &ArrayView2<'_, f64>) -> Result<()> {
        let (rows, cols) = window.dim();
        if (rows, cols) != (self.sequence_length, self.num_features) {
            return Err(ForecastError::ConfigMismatch {
                expected_rows: self.sequence_length,
                expected_cols: self.num_features,
                rows,
                cols,
            });
        }
        Ok(())
    }

    /// Returns exactly `horizon` scaled predictions, in order.
    ///
    /// The regressor is called once per step. Any failure aborts the whole run.
    pub fn forecast<R: PointRegressor + ?Sized>(
        &self,
        seed: ArrayView2<'_, f64>,
        horizon: usize,
        regressor: &R,
    ) -> Result<Vec<f64>> {
        if horizon == 0 {
            return Err(ForecastError::ForecastConfig(
                "horizon must be at least one day".into(),
            ));
        }
        self.ensure_shape(&seed)?;

        let last = self.sequence_length - 1;
        let mut window = seed.to_owned();
        let mut out = Vec::with_capacity(horizon);

        for step in 1..=horizon {
            self.ensure_shape(&window.view())?;
            let pred = regressor
                .predict_one(window.view())
                .map_err(ForecastError::Regressor)?;
            if !pred.is_finite() {
                return Err(ForecastError::Regressor(anyhow::anyhow!(
                    "non-finite prediction {pred} at step {step}"
                )));
            }
            debug!(step, scaled = pred, "rollout step");
            out.push(pred);

            if step < horizon {
                let mut next_row = window.row(last).to_owned();
                next_row[self.target_index] = pred;

                let mut next = Array2::zeros((self.sequence_length, self.num_features));
                next.slice_mut(s![..last, ..])
                    .assign(&window.slice(s![1.., ..]));
                next.row_mut(last).assign(&next_row);
                window = next;
            }
        }

        Ok(out)
    }
}
