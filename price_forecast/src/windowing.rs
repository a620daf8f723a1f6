//! Fixed-length training windows over a normalized feature matrix.
//!
//! Window `i` covers rows `i..i + L` and its target is row `i + L` of the target
//! column, so a `T`-row matrix gives `T - L` windows in chronological order.
//! Partitions are always split in time, never shuffled.

use ndarray::{Array1, Array3, ArrayView2, s};

use crate::{
    error::{ForecastError, Result},
    features::FeatureMatrix,
};

/// Windows stacked as `[N, L, F]` with one target per window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSet {
    pub windows: Array3<f64>,
    pub targets: Array1<f64>,
}

impl WindowSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn sequence_length(&self) -> usize {
        self.windows.dim().1
    }

    pub fn num_features(&self) -> usize {
        self.windows.dim().2
    }

    pub fn window(&self, i: usize) -> ArrayView2<'_, f64> {
        self.windows.slice(s![i, .., ..])
    }

    /// `(window, target)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (ArrayView2<'_, f64>, f64)> + '_ {
        self.windows.outer_iter().zip(self.targets.iter().copied())
    }

    fn slice_range(&self, start: usize, end: usize) -> WindowSet {
        WindowSet {
            windows: self.windows.slice(s![start..end, .., ..]).to_owned(),
            targets: self.targets.slice(s![start..end]).to_owned(),
        }
    }
}

/// Slices every full window of `sequence_length` rows.
///
/// Returns an empty set when the matrix has no more than `sequence_length` rows.
pub fn make_windows(
    matrix: &FeatureMatrix,
    sequence_length: usize,
    target_index: usize,
) -> Result<WindowSet> {
    if sequence_length == 0 {
        return Err(ForecastError::ForecastConfig(
            "sequence length must be positive".into(),
        ));
    }
    let (rows, cols) = matrix.dim();
    if target_index >= cols {
        return Err(ForecastError::ForecastConfig(format!(
            "target index {target_index} out of range for {cols} features"
        )));
    }

    let count = rows.saturating_sub(sequence_length);
    let mut windows = Array3::zeros((count, sequence_length, cols));
    for (i, mut window) in windows.outer_iter_mut().enumerate() {
        window.assign(&matrix.slice(s![i..i + sequence_length, ..]));
    }
    let targets = (sequence_length..rows)
        .map(|i| matrix[[i, target_index]])
        .collect();

    Ok(WindowSet { windows, targets })
}

/// Splits at `floor(len * train_ratio)`: earlier windows train, later windows test.
pub fn split_chronological(set: &WindowSet, train_ratio: f64) -> Result<(WindowSet, WindowSet)> {
    if !(0.0..=1.0).contains(&train_ratio) {
        return Err(ForecastError::ForecastConfig(format!(
            "train ratio {train_ratio} must be within [0, 1]"
        )));
    }
    let n = set.len();
    let cut = ((n as f64 * train_ratio).floor() as usize).min(n);
    Ok((set.slice_range(0, cut), set.slice_range(cut, n)))
}

/// The most recent `sequence_length` rows, the seed of a rollout.
pub fn last_window(matrix: &FeatureMatrix, sequence_length: usize) -> Result<FeatureMatrix> {
    let rows = matrix.nrows();
    if sequence_length == 0 || rows < sequence_length {
        return Err(ForecastError::DataInsufficient(format!(
            "need {sequence_length} feature rows for a seed window, have {rows}"
        )));
    }
    Ok(matrix.slice(s![rows - sequence_length.., ..]).to_owned())
}
