//! Daily price forecasting.
//!
//! The crate turns a daily OHLCV history into a multi-day point forecast:
//! indicators ([`indicators`]) feed a fixed feature matrix ([`features`]) that is
//! min-max normalized ([`scaler`]), sliced into training windows ([`windowing`]),
//! and rolled forward step by step by a point regressor ([`forecaster`],
//! [`regressor`]). [`assembler`] maps the scaled output back to prices and dates.
//!
//! Per-ticker state (scaler, sequence length, regressor weights, metadata) lives
//! in an [`artifacts::ArtifactStore`]; [`pipeline::ForecastPipeline`] wires the
//! whole flow to a [`market_data_ingestor::providers::MarketDataSource`].

pub mod artifacts;
pub mod assembler;
pub mod config;
pub mod error;
pub mod features;
pub mod forecaster;
pub mod indicators;
pub mod pipeline;
pub mod regressor;
pub mod scaler;
pub mod windowing;

pub use error::{ForecastError, Result};
