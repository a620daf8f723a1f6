//! Point regressors: one scaled window in, one scaled target out.
//!
//! The forecasting core only needs [`PointRegressor::predict_one`]; training adds
//! [`TrainableRegressor::fit`] and a serializable [`RegressorSnapshot`] so a fitted
//! model can be stored next to its scaler and rebuilt for prediction.
//!
//! Built-ins:
//! - [`PersistenceRegressor`]: repeats the target of the window's last row.
//! - [`LinearRegressor`]: ridge least squares on the last row's features.
//! - [`FnRegressor`]: wraps a closure, handy for deterministic stubs.

use std::{fmt, str::FromStr};

use anyhow::{Context, bail, ensure};
use ndarray::{Array1, Array2, ArrayView2, Axis, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    error::{ForecastError, Result},
    windowing::WindowSet,
};

/// Maps a `[L, F]` scaled window to the next scaled target value.
pub trait PointRegressor: Send + Sync {
    fn predict_one(&self, window: ArrayView2<'_, f64>) -> anyhow::Result<f64>;
}

/// A regressor that can be fit on training windows and persisted.
pub trait TrainableRegressor: PointRegressor {
    fn fit(&mut self, train: &WindowSet) -> anyhow::Result<()>;

    fn snapshot(&self) -> RegressorSnapshot;
}

/// Built-in regressor names accepted by configuration and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressorKind {
    Persistence,
    #[default]
    Linear,
}

#[derive(Debug, Error)]
#[error("unknown regressor '{0}' (expected persistence or linear)")]
pub struct UnknownRegressor(String);

impl RegressorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegressorKind::Persistence => "persistence",
            RegressorKind::Linear => "linear",
        }
    }

    /// An unfitted regressor of this kind predicting `target_index`.
    pub fn build(&self, target_index: usize) -> Box<dyn TrainableRegressor> {
        match self {
            RegressorKind::Persistence => Box::new(PersistenceRegressor::new(target_index)),
            RegressorKind::Linear => Box::new(LinearRegressor::new(DEFAULT_RIDGE_LAMBDA)),
        }
    }
}

impl fmt::Display for RegressorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegressorKind {
    type Err = UnknownRegressor;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "persistence" => Ok(RegressorKind::Persistence),
            "linear" => Ok(RegressorKind::Linear),
            other => Err(UnknownRegressor(other.to_string())),
        }
    }
}

/// Persisted form of a fitted regressor (`model.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorSnapshot {
    Persistence {
        target_index: usize,
    },
    Linear {
        lambda: f64,
        weights: Vec<f64>,
        bias: f64,
    },
}

impl RegressorSnapshot {
    pub fn kind(&self) -> RegressorKind {
        match self {
            RegressorSnapshot::Persistence { .. } => RegressorKind::Persistence,
            RegressorSnapshot::Linear { .. } => RegressorKind::Linear,
        }
    }

    pub fn into_regressor(self) -> Box<dyn PointRegressor> {
        match self {
            RegressorSnapshot::Persistence { target_index } => {
                Box::new(PersistenceRegressor::new(target_index))
            }
            RegressorSnapshot::Linear {
                lambda,
                weights,
                bias,
            } => Box::new(LinearRegressor {
                lambda,
                weights,
                bias,
            }),
        }
    }
}

fn last_row<'a>(window: &'a ArrayView2<'_, f64>) -> anyhow::Result<ndarray::ArrayView1<'a, f64>> {
    let rows = window.nrows();
    ensure!(rows > 0, "empty window");
    Ok(window.row(rows - 1))
}

/// Naive baseline: tomorrow looks like today.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceRegressor {
    target_index: usize,
}

impl PersistenceRegressor {
    pub fn new(target_index: usize) -> Self {
        Self { target_index }
    }
}

impl PointRegressor for PersistenceRegressor {
    fn predict_one(&self, window: ArrayView2<'_, f64>) -> anyhow::Result<f64> {
        let row = last_row(&window)?;
        row.get(self.target_index).copied().with_context(|| {
            format!(
                "target index {} outside window of width {}",
                self.target_index,
                row.len()
            )
        })
    }
}

impl TrainableRegressor for PersistenceRegressor {
    fn fit(&mut self, _train: &WindowSet) -> anyhow::Result<()> {
        Ok(())
    }

    fn snapshot(&self) -> RegressorSnapshot {
        RegressorSnapshot::Persistence {
            target_index: self.target_index,
        }
    }
}

pub const DEFAULT_RIDGE_LAMBDA: f64 = 1e-3;

/// `y = w · x_last + b`, fit by ridge-regularized normal equations.
///
/// The bias is not regularized.
#[derive(Debug, Clone)]
pub struct LinearRegressor {
    lambda: f64,
    weights: Vec<f64>,
    bias: f64,
}

impl LinearRegressor {
    pub fn new(lambda: f64) -> Self {
        Self {
            lambda,
            weights: Vec::new(),
            bias: 0.0,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }
}

impl PointRegressor for LinearRegressor {
    fn predict_one(&self, window: ArrayView2<'_, f64>) -> anyhow::Result<f64> {
        ensure!(!self.weights.is_empty(), "linear regressor is not fitted");
        let row = last_row(&window)?;
        ensure!(
            row.len() == self.weights.len(),
            "window width {} does not match {} fitted weights",
            row.len(),
            self.weights.len()
        );
        Ok(row.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>() + self.bias)
    }
}

impl TrainableRegressor for LinearRegressor {
    fn fit(&mut self, train: &WindowSet) -> anyhow::Result<()> {
        ensure!(!train.is_empty(), "no training windows");
        let f = train.num_features();
        let dim = f + 1;

        // Normal equations over [x_last, 1].
        let mut a = Array2::<f64>::zeros((dim, dim));
        let mut b = Array1::<f64>::zeros(dim);
        let mut x = Array1::<f64>::ones(dim);
        for (window, target) in train.iter() {
            x.slice_mut(s![..f]).assign(&last_row(&window)?);
            a += &outer(&x);
            b.scaled_add(target, &x);
        }
        for i in 0..f {
            a[[i, i]] += self.lambda;
        }

        let solution = solve(a, b)?;
        self.bias = solution[f];
        self.weights = solution.slice(s![..f]).to_vec();
        Ok(())
    }

    fn snapshot(&self) -> RegressorSnapshot {
        RegressorSnapshot::Linear {
            lambda: self.lambda,
            weights: self.weights.clone(),
            bias: self.bias,
        }
    }
}

fn outer(x: &Array1<f64>) -> Array2<f64> {
    let col = x.view().insert_axis(Axis(1));
    let row = x.view().insert_axis(Axis(0));
    col.dot(&row)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> anyhow::Result<Array1<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < 1e-12 {
            bail!("normal equations are singular at column {col}");
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        let pivot_row = a.row(col).to_owned();
        for row in col + 1..n {
            let factor = a[[row, col]] / pivot_row[col];
            if factor == 0.0 {
                continue;
            }
            a.row_mut(row).scaled_add(-factor, &pivot_row);
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail = a.slice(s![row, row + 1..]).dot(&x.slice(s![row + 1..]));
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}

/// Wraps a closure as a regressor.
pub struct FnRegressor<F>(pub F);

impl<F> PointRegressor for FnRegressor<F>
where
    F: Fn(ArrayView2<'_, f64>) -> f64 + Send + Sync,
{
    fn predict_one(&self, window: ArrayView2<'_, f64>) -> anyhow::Result<f64> {
        Ok((self.0)(window))
    }
}

/// Error of a regressor over a window set, in scaled units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Mean squared error (the training loss).
    pub mse: f64,
    /// Mean absolute error.
    pub mae: f64,
}

pub fn evaluate<R: PointRegressor + ?Sized>(regressor: &R, set: &WindowSet) -> Result<Metrics> {
    if set.is_empty() {
        return Err(ForecastError::DataInsufficient(
            "no windows to evaluate on".into(),
        ));
    }
    let mut sq = 0.0;
    let mut abs = 0.0;
    for (window, target) in set.iter() {
        let pred = regressor
            .predict_one(window)
            .map_err(ForecastError::Regressor)?;
        let err = pred - target;
        sq += err * err;
        abs += err.abs();
    }
    let n = set.len() as f64;
    Ok(Metrics {
        mse: sq / n,
        mae: abs / n,
    })
}
