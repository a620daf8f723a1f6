//! End-to-end training and forecasting.
//!
//! Training:
//! fetch → indicators → feature matrix → fit scaler → transform → windows →
//! chronological split → fit regressor → evaluate on the test partition → save.
//!
//! Forecasting:
//! open artifacts → fetch → indicators → compatibility check → transform with the
//! stored scaler → last `L` rows → rollout → assemble.
//!
//! The async entrypoints only await the market data source; everything after the
//! fetch runs synchronously, and [`forecast_from_frame`] exposes that part without
//! any I/O.

use std::sync::Arc;

use market_data_ingestor::providers::{MarketDataSource, normalize_ticker};
use serde::Serialize;
use tracing::info;

use crate::{
    artifacts::{ArtifactMetadata, ArtifactSet, ArtifactStore, TRAINED_ON_FORMAT},
    assembler::{ForecastStep, HistoricalBar, assemble, historical_window},
    config::{PipelineConfig, PredictionConfig, TrainingConfig},
    error::{ForecastError, Result},
    features::{CLOSE_INDEX, FEATURE_COLUMNS, NUM_FEATURES, feature_column_order},
    forecaster::AutoregressiveForecaster,
    indicators::{IndicatorEngine, IndicatorFrame},
    regressor::{PointRegressor, evaluate},
    scaler::FeatureScaler,
    windowing::{last_window, make_windows, split_chronological},
};

/// Output of one forecasting run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub ticker: String,
    /// Last observed close, the reference for `change_percent`.
    pub current_price: f64,
    pub predictions: Vec<ForecastStep>,
    pub historical: Vec<HistoricalBar>,
    pub metadata: ArtifactMetadata,
}

/// Output of one training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub ticker: String,
    pub bars: usize,
    pub feature_rows: usize,
    pub train_windows: usize,
    pub test_windows: usize,
    pub metadata: ArtifactMetadata,
}

pub struct ForecastPipeline {
    store: Arc<ArtifactStore>,
    engine: IndicatorEngine,
    prediction: PredictionConfig,
}

impl ForecastPipeline {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        Self {
            store,
            engine: IndicatorEngine::default(),
            prediction: PredictionConfig::default(),
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(Arc::new(ArtifactStore::new(&cfg.artifact_dir)))
            .with_prediction(cfg.prediction.clone())
    }

    pub fn with_prediction(mut self, prediction: PredictionConfig) -> Self {
        self.prediction = prediction;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Fits and persists a model for `ticker`.
    ///
    /// The ticker's write lock is held from scaler fitting through the final
    /// rename, so concurrent forecasts see either the old or the new set.
    pub async fn train(
        &self,
        ticker: &str,
        source: &dyn MarketDataSource,
        opts: &TrainingConfig,
    ) -> Result<TrainingReport> {
        let ticker = normalize_ticker(ticker)?;
        if !(opts.train_ratio > 0.0 && opts.train_ratio < 1.0) {
            return Err(ForecastError::ForecastConfig(format!(
                "train ratio {} must be within (0, 1)",
                opts.train_ratio
            )));
        }
        info!(%ticker, period = %opts.period, "training");

        let series = source.fetch(&ticker, opts.period).await?;
        let frame = self.engine.compute(&series);
        if frame.is_empty() {
            return Err(ForecastError::DataInsufficient(format!(
                "{ticker}: {} bars do not cover the {}-bar indicator warm-up",
                series.len(),
                self.engine.warmup() + 1
            )));
        }
        let matrix = frame.feature_matrix();

        let mut counts = (0, 0);
        let handle = self.store.save_with(&ticker, || {
            let scaling = FeatureScaler::default().fit(&matrix)?;
            let scaled = scaling.transform(&matrix)?;
            let windows = make_windows(&scaled, opts.sequence_length, CLOSE_INDEX)?;
            let (train, test) = split_chronological(&windows, opts.train_ratio)?;
            if train.is_empty() || test.is_empty() {
                return Err(ForecastError::DataInsufficient(format!(
                    "{ticker}: {} feature rows give {} train / {} test windows of length {}",
                    frame.len(),
                    train.len(),
                    test.len(),
                    opts.sequence_length
                )));
            }
            counts = (train.len(), test.len());

            let mut model = opts.regressor.build(CLOSE_INDEX);
            model.fit(&train).map_err(ForecastError::Regressor)?;
            let metrics = evaluate(model.as_ref(), &test)?;
            info!(%ticker, mse = metrics.mse, mae = metrics.mae, "evaluated on test partition");

            Ok(ArtifactSet {
                metadata: ArtifactMetadata {
                    ticker: ticker.clone(),
                    period: opts.period,
                    sequence_length: opts.sequence_length,
                    num_features: NUM_FEATURES,
                    test_loss: metrics.mse,
                    test_mae: metrics.mae,
                    trained_on: chrono::Local::now().format(TRAINED_ON_FORMAT).to_string(),
                    feature_column_order: feature_column_order(),
                    regressor: opts.regressor,
                },
                scaling,
                model: model.snapshot(),
            })
        })?;

        Ok(TrainingReport {
            ticker,
            bars: series.len(),
            feature_rows: frame.len(),
            train_windows: counts.0,
            test_windows: counts.1,
            metadata: handle.set().metadata.clone(),
        })
    }

    /// Forecasts `horizon` days for a previously trained `ticker`.
    pub async fn predict(
        &self,
        ticker: &str,
        horizon: usize,
        source: &dyn MarketDataSource,
    ) -> Result<ForecastReport> {
        let ticker = normalize_ticker(ticker)?;
        if horizon == 0 {
            return Err(ForecastError::ForecastConfig(
                "horizon must be at least one day".into(),
            ));
        }

        // A handle is a complete snapshot; a retrain after this point does not affect the run.
        let handle = self.store.open(&ticker)?;
        let set = handle.set();
        set.ensure_compatible(&FEATURE_COLUMNS)?;

        let series = source.fetch(&ticker, self.prediction.period).await?;
        let frame = self.engine.compute(&series);
        let regressor = set.regressor();
        let report = forecast_from_frame(
            &frame,
            set,
            regressor.as_ref(),
            horizon,
            self.prediction.history_len,
        )?;

        info!(
            %ticker,
            horizon,
            current_price = report.current_price,
            "forecast complete"
        );
        Ok(report)
    }
}

/// Runs the synchronous forecasting core on an already computed frame.
pub fn forecast_from_frame<R: PointRegressor + ?Sized>(
    frame: &IndicatorFrame,
    artifacts: &ArtifactSet,
    regressor: &R,
    horizon: usize,
    history_len: usize,
) -> Result<ForecastReport> {
    artifacts.ensure_compatible(&FEATURE_COLUMNS)?;
    let (Some(last_date), Some(last_close)) = (frame.last_date(), frame.last_close()) else {
        return Err(ForecastError::DataInsufficient(format!(
            "{}: no rows left after the indicator warm-up",
            frame.symbol
        )));
    };

    let meta = &artifacts.metadata;
    let scaled = artifacts.scaling.transform(&frame.feature_matrix())?;
    let seed = last_window(&scaled, meta.sequence_length)?;
    let forecaster =
        AutoregressiveForecaster::new(meta.sequence_length, meta.num_features, CLOSE_INDEX)?;
    let predictions = forecaster.forecast(seed.view(), horizon, regressor)?;
    let steps = assemble(
        &predictions,
        &artifacts.scaling,
        CLOSE_INDEX,
        last_date,
        last_close,
    )?;

    Ok(ForecastReport {
        ticker: frame.symbol.clone(),
        current_price: last_close,
        predictions: steps,
        historical: historical_window(frame, history_len),
        metadata: meta.clone(),
    })
}
