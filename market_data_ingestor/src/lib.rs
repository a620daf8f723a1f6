//! Daily market data ingestion.
//!
//! This crate defines the canonical daily bar model ([`models::bar::Bar`],
//! [`models::bar::BarSeries`]), the look-back [`models::period::Period`] a caller asks for,
//! and the [`providers::MarketDataSource`] trait implemented by every concrete source
//! (Alpaca REST, CSV exports, in-memory fixtures).

pub mod env;
pub mod models;
pub mod providers;
