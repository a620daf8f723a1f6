use std::sync::Arc;

use chrono::{Days, NaiveDate};
use market_data_ingestor::{
    models::bar::{Bar, BarSeries},
    providers::{csv_file::CsvSource, memory::StaticSource},
};
use ndarray::ArrayView2;
use price_forecast::{
    ForecastError,
    artifacts::{ArtifactMetadata, ArtifactSet, ArtifactStore},
    config::{PredictionConfig, TrainingConfig},
    features::{CLOSE_INDEX, NUM_FEATURES, feature_column_order},
    indicators::IndicatorEngine,
    pipeline::{ForecastPipeline, forecast_from_frame},
    regressor::{FnRegressor, RegressorKind, RegressorSnapshot},
    scaler::ScalingModel,
};
use tempfile::TempDir;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn synthetic(symbol: &str, n: usize, base: f64) -> BarSeries {
    let bars = (0..n)
        .map(|i| {
            let t = i as f64;
            let close = base + 0.05 * t + 4.0 * (t / 9.0).sin() + 1.5 * (t / 2.3).cos();
            Bar {
                date: start() + Days::new(i as u64),
                open: close - 0.3,
                high: close + 1.2,
                low: close - 1.1,
                close,
                volume: 2.0e6 + 1.0e5 * (t / 5.0).sin(),
            }
        })
        .collect();
    BarSeries::new(symbol, bars)
}

fn pipeline(dir: &TempDir) -> ForecastPipeline {
    ForecastPipeline::new(Arc::new(ArtifactStore::new(dir.path())))
}

fn training(kind: RegressorKind, sequence_length: usize) -> TrainingConfig {
    TrainingConfig {
        sequence_length,
        regressor: kind,
        ..Default::default()
    }
}

#[tokio::test]
async fn train_then_predict_with_persistence() {
    let dir = TempDir::new().unwrap();
    let source = StaticSource::new().with_series(synthetic("AAPL", 400, 150.0));
    let pipeline = pipeline(&dir);

    let trained = pipeline
        .train("aapl", &source, &training(RegressorKind::Persistence, 20))
        .await
        .unwrap();
    assert_eq!(trained.ticker, "AAPL");
    assert_eq!(trained.bars, 400);
    assert_eq!(trained.feature_rows, 351);
    assert_eq!(trained.train_windows + trained.test_windows, 331);
    assert_eq!(trained.train_windows, 264);
    assert_eq!(trained.metadata.num_features, NUM_FEATURES);
    assert_eq!(trained.metadata.feature_column_order, feature_column_order());
    assert!(trained.metadata.test_loss >= 0.0 && trained.metadata.test_mae >= 0.0);
    assert!(dir.path().join("AAPL").join("metadata.json").is_file());

    let report = pipeline.predict("AAPL", 7, &source).await.unwrap();
    assert_eq!(report.ticker, "AAPL");
    assert_eq!(report.predictions.len(), 7);
    assert_eq!(report.historical.len(), 60);

    let last = report.historical.last().unwrap();
    assert_eq!(report.current_price, last.close);
    for (i, step) in report.predictions.iter().enumerate() {
        assert_eq!(step.date, last.date + Days::new(i as u64 + 1));
        assert!((step.price - report.current_price).abs() < 1e-6);
    }
}

#[tokio::test]
async fn linear_model_round_trips_through_disk() {
    let dir = TempDir::new().unwrap();
    let source = StaticSource::new().with_series(synthetic("MSFT", 500, 300.0));

    let trained = pipeline(&dir)
        .train("MSFT", &source, &training(RegressorKind::Linear, 30))
        .await
        .unwrap();
    assert_eq!(trained.metadata.regressor, RegressorKind::Linear);
    assert!(trained.metadata.test_loss.is_finite());

    // A fresh pipeline has an empty cache and must load from disk.
    let report = pipeline(&dir)
        .with_prediction(PredictionConfig {
            history_len: 15,
            ..Default::default()
        })
        .predict("msft", 10, &source)
        .await
        .unwrap();
    assert_eq!(report.predictions.len(), 10);
    assert_eq!(report.historical.len(), 15);
    assert!(report.predictions.iter().all(|s| s.price.is_finite()));
    assert_eq!(report.metadata, trained.metadata);
}

#[tokio::test]
async fn short_history_is_data_insufficient() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);

    // Below the indicator warm-up.
    let source = StaticSource::new().with_series(synthetic("AAPL", 45, 100.0));
    let err = pipeline
        .train("AAPL", &source, &training(RegressorKind::Persistence, 60))
        .await
        .unwrap_err();
    assert!(matches!(err, ForecastError::DataInsufficient(_)), "{err}");

    // Enough for indicators but not for 60-row windows.
    let source = StaticSource::new().with_series(synthetic("AAPL", 100, 100.0));
    let err = pipeline
        .train("AAPL", &source, &training(RegressorKind::Persistence, 60))
        .await
        .unwrap_err();
    assert!(matches!(err, ForecastError::DataInsufficient(_)), "{err}");

    // Nothing was persisted by the failed runs.
    assert!(!dir.path().join("AAPL").exists());
}

#[tokio::test]
async fn unknown_ticker_and_untrained_ticker() {
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline(&dir);
    let source = StaticSource::new().with_series(synthetic("AAPL", 200, 100.0));

    let err = pipeline
        .train("TSLA", &source, &TrainingConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ForecastError::DataInsufficient(_)), "{err}");

    let err = pipeline.predict("AAPL", 7, &source).await.unwrap_err();
    assert!(matches!(err, ForecastError::ArtifactNotFound { .. }), "{err}");

    let err = pipeline.predict("AAPL", 0, &source).await.unwrap_err();
    assert!(matches!(err, ForecastError::ForecastConfig(_)), "{err}");
}

#[tokio::test]
async fn tickers_train_and_predict_concurrently() {
    let dir = TempDir::new().unwrap();
    let source = StaticSource::new()
        .with_series(synthetic("AAPL", 300, 150.0))
        .with_series(synthetic("MSFT", 300, 300.0));
    let pipeline = pipeline(&dir);
    let opts = training(RegressorKind::Linear, 20);

    pipeline.train("MSFT", &source, &opts).await.unwrap();
    let (trained, forecast) = tokio::join!(
        pipeline.train("AAPL", &source, &opts),
        pipeline.predict("MSFT", 5, &source),
    );
    assert_eq!(trained.unwrap().ticker, "AAPL");
    assert_eq!(forecast.unwrap().predictions.len(), 5);
}

#[tokio::test]
async fn csv_history_end_to_end() {
    let data = TempDir::new().unwrap();
    let mut csv = String::from("Date,Open,High,Low,Close,Volume\n");
    for bar in synthetic("SPY", 200, 400.0).bars {
        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
        ));
    }
    std::fs::write(data.path().join("SPY.csv"), csv).unwrap();

    let artifacts = TempDir::new().unwrap();
    let source = CsvSource::new(data.path()).unwrap();
    let pipeline = pipeline(&artifacts);
    pipeline
        .train("spy", &source, &training(RegressorKind::Persistence, 10))
        .await
        .unwrap();
    let report = pipeline.predict("SPY", 3, &source).await.unwrap();
    assert_eq!(report.predictions.len(), 3);
    assert_eq!(report.historical.last().unwrap().date, start() + Days::new(199));
}

#[test]
fn report_json_shape() {
    let bars = (0..51u64)
        .map(|i| {
            let close = match i {
                49 => 120.0,
                50 => 128.0,
                _ => 100.0 + (i % 7) as f64,
            };
            Bar {
                date: start() + Days::new(i),
                open: close - 1.0,
                high: close + 2.0,
                low: close - 2.0,
                close,
                volume: 1.0e6,
            }
        })
        .collect();
    let frame = IndicatorEngine::default().compute(&BarSeries::new("AAPL", bars));

    let mut min = vec![0.0; NUM_FEATURES];
    let mut max = vec![1.0e7; NUM_FEATURES];
    min[CLOSE_INDEX] = 100.0;
    max[CLOSE_INDEX] = 200.0;
    min[7] = -1.0e7;
    min[8] = -1.0e7;
    let set = ArtifactSet {
        metadata: ArtifactMetadata {
            ticker: "AAPL".into(),
            period: "5y".parse().unwrap(),
            sequence_length: 1,
            num_features: NUM_FEATURES,
            test_loss: 0.0,
            test_mae: 0.0,
            trained_on: "2024-01-01 00:00:00".into(),
            feature_column_order: feature_column_order(),
            regressor: RegressorKind::Persistence,
        },
        scaling: ScalingModel::new(feature_column_order(), min, max).unwrap(),
        model: RegressorSnapshot::Persistence { target_index: 0 },
    };

    let report = forecast_from_frame(
        &frame,
        &set,
        &FnRegressor(|_: ArrayView2<'_, f64>| 0.6),
        2,
        60,
    )
    .unwrap();
    let json = serde_json::to_string_pretty(&report).unwrap();

    insta::assert_snapshot!(json, @r#"
{
  "ticker": "AAPL",
  "current_price": 128.0,
  "predictions": [
    {
      "date": "2024-02-21",
      "scaled_value": 0.6,
      "price": 160.0,
      "change_percent": 25.0
    },
    {
      "date": "2024-02-22",
      "scaled_value": 0.6,
      "price": 160.0,
      "change_percent": 25.0
    }
  ],
  "historical": [
    {
      "date": "2024-02-19",
      "open": 119.0,
      "high": 122.0,
      "low": 118.0,
      "close": 120.0,
      "volume": 1000000.0
    },
    {
      "date": "2024-02-20",
      "open": 127.0,
      "high": 130.0,
      "low": 126.0,
      "close": 128.0,
      "volume": 1000000.0
    }
  ],
  "metadata": {
    "ticker": "AAPL",
    "period": "5y",
    "sequence_length": 1,
    "num_features": 9,
    "test_loss": 0.0,
    "test_mae": 0.0,
    "trained_on": "2024-01-01 00:00:00",
    "feature_column_order": [
      "Close",
      "Volume",
      "SMA_20",
      "SMA_50",
      "EMA_12",
      "EMA_26",
      "RSI",
      "MACD",
      "MACD_Signal"
    ],
    "regressor": "persistence"
  }
}
"#);
}
