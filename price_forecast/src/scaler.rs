//! Per-column min-max normalization.
//!
//! A [`ScalingModel`] is fit once at training time, persisted with the other
//! artifacts and reused unchanged for every forecast on the same ticker. Columns
//! are independent: inverting one column only needs that column's `(min, max)`.

use ndarray::Axis;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    error::{ForecastError, Result},
    features::{FEATURE_COLUMNS, FeatureMatrix},
};

/// Fitted `(min, max)` per named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingModel {
    columns: Vec<String>,
    min: Vec<f64>,
    max: Vec<f64>,
}

impl ScalingModel {
    /// Builds a model from explicit bounds, e.g. when loading or in tests.
    pub fn new(columns: Vec<String>, min: Vec<f64>, max: Vec<f64>) -> Result<Self> {
        if columns.len() != min.len() || columns.len() != max.len() {
            return Err(ForecastError::ScalerMismatch(format!(
                "{} columns but {} minima and {} maxima",
                columns.len(),
                min.len(),
                max.len()
            )));
        }
        for (i, (lo, hi)) in min.iter().zip(&max).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(ForecastError::ScalerMismatch(format!(
                    "column {} has invalid range [{lo}, {hi}]",
                    columns[i]
                )));
            }
        }
        Ok(Self { columns, min, max })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn num_features(&self) -> usize {
        self.columns.len()
    }

    /// `(min, max)` of one column.
    pub fn range(&self, feature_index: usize) -> Option<(f64, f64)> {
        Some((*self.min.get(feature_index)?, *self.max.get(feature_index)?))
    }

    /// Fails unless the model was fit on exactly `live` in the same order.
    pub fn ensure_columns(&self, live: &[&str]) -> Result<()> {
        let same = self.columns.len() == live.len()
            && self.columns.iter().zip(live).all(|(a, b)| a == b);
        if same {
            Ok(())
        } else {
            Err(ForecastError::ScalerMismatch(format!(
                "scaler columns {:?} do not match live columns {:?}",
                self.columns, live
            )))
        }
    }

    /// `(value - min) / (max - min)` per column; constant columns map to 0.
    pub fn transform(&self, matrix: &FeatureMatrix) -> Result<FeatureMatrix> {
        if matrix.ncols() != self.num_features() {
            return Err(ForecastError::ScalerMismatch(format!(
                "matrix has {} columns, scaler was fit on {}",
                matrix.ncols(),
                self.num_features()
            )));
        }
        let mut out = matrix.clone();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (lo, hi) = (self.min[j], self.max[j]);
            let span = hi - lo;
            if span == 0.0 {
                col.fill(0.0);
            } else {
                col.mapv_inplace(|v| (v - lo) / span);
            }
        }
        Ok(out)
    }

    /// `value * (max - min) + min` using only `feature_index`'s bounds.
    pub fn inverse_transform_feature(
        &self,
        values: &[f64],
        feature_index: usize,
    ) -> Result<Vec<f64>> {
        let (lo, hi) = self.range(feature_index).ok_or_else(|| {
            ForecastError::ScalerMismatch(format!(
                "feature index {feature_index} out of range for {} columns",
                self.num_features()
            ))
        })?;
        Ok(values.iter().map(|v| v * (hi - lo) + lo).collect())
    }
}

/// Fits a [`ScalingModel`] over named columns.
#[derive(Debug, Clone)]
pub struct FeatureScaler {
    columns: Vec<String>,
}

impl Default for FeatureScaler {
    fn default() -> Self {
        Self::new(FEATURE_COLUMNS)
    }
}

impl FeatureScaler {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Column-wise min and max over all rows.
    pub fn fit(&self, matrix: &FeatureMatrix) -> Result<ScalingModel> {
        if matrix.nrows() == 0 {
            return Err(ForecastError::DataInsufficient(
                "cannot fit a scaler on an empty matrix".into(),
            ));
        }
        if matrix.ncols() != self.columns.len() {
            return Err(ForecastError::ScalerMismatch(format!(
                "matrix has {} columns, expected {}",
                matrix.ncols(),
                self.columns.len()
            )));
        }

        let mut min = Vec::with_capacity(matrix.ncols());
        let mut max = Vec::with_capacity(matrix.ncols());
        for (j, col) in matrix.axis_iter(Axis(1)).enumerate() {
            let lo = col.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if lo == hi {
                warn!(column = %self.columns[j], value = lo, "constant feature column scales to 0");
            }
            min.push(lo);
            max.push(hi);
        }
        ScalingModel::new(self.columns.clone(), min, max)
    }
}
