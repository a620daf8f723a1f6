use std::path::PathBuf;

use market_data_ingestor::providers::ProviderError;
use thiserror::Error;

pub type Result<T, E = ForecastError> = std::result::Result<T, E>;

/// Failures of a training or forecasting run.
///
/// None of these are retried; a run either completes or returns one of them.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Too little history for the indicator warm-up, windowing or the train/test split.
    #[error("insufficient data: {0}")]
    DataInsufficient(String),

    /// Persisted scaler or metadata disagree with the live feature columns.
    #[error("scaler mismatch: {0}")]
    ScalerMismatch(String),

    /// A rollout window does not have the shape the scaler was fit for.
    #[error(
        "window shape mismatch: expected ({expected_rows}, {expected_cols}), got ({rows}, {cols})"
    )]
    ConfigMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("invalid forecast configuration: {0}")]
    ForecastConfig(String),

    /// The last observed price cannot anchor a percentage change.
    #[error("reference price must be finite and non-zero, got {0}")]
    InvalidReferencePrice(f64),

    #[error("regressor failed: {0:#}")]
    Regressor(anyhow::Error),

    #[error("no trained artifacts for {ticker} under {}", dir.display())]
    ArtifactNotFound { ticker: String, dir: PathBuf },

    #[error("artifact I/O on {}: {source}", path.display())]
    ArtifactIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact {}: {source}", path.display())]
    ArtifactFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("market data source failed: {0}")]
    Source(#[source] ProviderError),
}

impl From<ProviderError> for ForecastError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NoData { .. } => ForecastError::DataInsufficient(err.to_string()),
            other => ForecastError::Source(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use market_data_ingestor::{
        models::{bar::BarSeries, period::Period},
        providers::{MarketDataSource, memory::StaticSource},
    };

    use super::*;

    #[tokio::test]
    async fn empty_history_maps_to_data_insufficient() {
        let err = StaticSource::new()
            .fetch("AAPL", Period::Max)
            .await
            .unwrap_err();
        let err = ForecastError::from(err);
        assert!(matches!(err, ForecastError::DataInsufficient(_)), "{err}");
        assert!(err.to_string().contains("AAPL"));

        let invalid = StaticSource::new()
            .with_series(BarSeries::new("AAPL", vec![]))
            .fetch("aa pl", Period::Max)
            .await
            .unwrap_err();
        assert!(matches!(
            ForecastError::from(invalid),
            ForecastError::Source(_)
        ));
    }
}
