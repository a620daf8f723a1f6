//! The fixed, ordered feature columns fed to the regressor.
//!
//! Column order is part of the persisted contract: a scaler fit on one order is
//! meaningless for another, so artifacts record it and predictions refuse to run
//! when it changes.

use ndarray::Array2;

/// Feature column names, in matrix order.
pub const FEATURE_COLUMNS: [&str; NUM_FEATURES] = [
    "Close",
    "Volume",
    "SMA_20",
    "SMA_50",
    "EMA_12",
    "EMA_26",
    "RSI",
    "MACD",
    "MACD_Signal",
];

pub const NUM_FEATURES: usize = 9;

/// Index of `Close`, the only column propagated through a rollout.
pub const CLOSE_INDEX: usize = 0;

/// `[T, F]` matrix, one row per trading day, columns in [`FEATURE_COLUMNS`] order.
pub type FeatureMatrix = Array2<f64>;

/// Owned copy of [`FEATURE_COLUMNS`] for persistence.
pub fn feature_column_order() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

pub fn column_index(name: &str) -> Option<usize> {
    FEATURE_COLUMNS.iter().position(|c| *c == name)
}
