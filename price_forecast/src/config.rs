//! Pipeline configuration: parsing, validation, and loading.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```toml
//! artifact_dir = "models"
//!
//! [training]
//! period = "5y"
//! sequence_length = 60
//! train_ratio = 0.8
//! regressor = "linear"
//!
//! [prediction]
//! period = "1y"
//! horizon = 7
//! history_len = 60
//!
//! [source]
//! kind = "alpaca"    # or "csv"
//! csv_dir = "data"
//! ```
//!
//! Entrypoints:
//! - Parse + validate from a TOML string: [`load_config_str`]
//! - Parse + validate from a file path: [`load_config_path`]
//! - Build the configured market data source: [`SourceConfig::build`]

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use market_data_ingestor::{
    models::period::Period,
    providers::{
        MarketDataSource, alpaca_rest::AlpacaProvider, csv_file::CsvSource,
    },
};
use serde::{Deserialize, Serialize};
use toml::from_str;

use crate::regressor::RegressorKind;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    /// Root of the per-ticker artifact directories.
    pub artifact_dir: PathBuf,
    pub training: TrainingConfig,
    pub prediction: PredictionConfig,
    pub source: SourceConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("models"),
            training: TrainingConfig::default(),
            prediction: PredictionConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrainingConfig {
    /// History requested from the source.
    pub period: Period,
    /// Window length `L`, stored with the artifacts.
    pub sequence_length: usize,
    /// Share of windows used for fitting; the rest is the test partition.
    pub train_ratio: f64,
    pub regressor: RegressorKind,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            period: Period::Years(nonzero(5)),
            sequence_length: 60,
            train_ratio: 0.8,
            regressor: RegressorKind::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct PredictionConfig {
    pub period: Period,
    /// Days to forecast.
    pub horizon: usize,
    /// Observed days returned alongside the forecast.
    pub history_len: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            period: Period::Years(nonzero(1)),
            horizon: 7,
            history_len: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Alpaca,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Directory of `<TICKER>.csv` files; required when `kind = "csv"`.
    pub csv_dir: Option<PathBuf>,
}

impl SourceConfig {
    /// Instantiates the configured source. Alpaca reads its keys from the environment.
    pub fn build(&self) -> anyhow::Result<Box<dyn MarketDataSource>> {
        match self.kind {
            SourceKind::Alpaca => {
                let provider = AlpacaProvider::new().context("failed to set up Alpaca source")?;
                Ok(Box::new(provider))
            }
            SourceKind::Csv => {
                let Some(dir) = &self.csv_dir else {
                    bail!("source.csv_dir is required for csv sources");
                };
                let source = CsvSource::new(dir).context("failed to set up CSV source")?;
                Ok(Box::new(source))
            }
        }
    }
}

fn nonzero(n: u32) -> std::num::NonZeroU32 {
    std::num::NonZeroU32::new(n).unwrap_or(std::num::NonZeroU32::MIN)
}

impl PipelineConfig {
    /// Rejects values no run could succeed with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let t = &self.training;
        if t.sequence_length == 0 {
            bail!("training.sequence_length must be positive");
        }
        if !(t.train_ratio > 0.0 && t.train_ratio < 1.0) {
            bail!(
                "training.train_ratio must be within (0, 1), got {}",
                t.train_ratio
            );
        }
        if self.prediction.horizon == 0 {
            bail!("prediction.horizon must be at least 1");
        }
        if self.source.kind == SourceKind::Csv && self.source.csv_dir.is_none() {
            bail!("source.csv_dir is required when source.kind = \"csv\"");
        }
        Ok(())
    }
}

/// Parse and validate a configuration from a TOML string.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<PipelineConfig> {
    let cfg: PipelineConfig = from_str(toml_str).context("failed to parse config TOML")?;
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

/// Read a configuration file from disk, parse, and validate it.
///
/// A relative `source.csv_dir` or `artifact_dir` is resolved against the file's directory.
pub fn load_config_path(path: impl AsRef<Path>) -> anyhow::Result<PipelineConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let mut cfg = load_config_str(&text)?;

    if let Some(base) = path.parent() {
        if cfg.artifact_dir.is_relative() {
            cfg.artifact_dir = base.join(&cfg.artifact_dir);
        }
        if let Some(dir) = cfg.source.csv_dir.as_mut().filter(|d| d.is_relative()) {
            *dir = base.join(&*dir);
        }
    }
    Ok(cfg)
}
