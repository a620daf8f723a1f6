use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Deserialize;

use crate::models::bar::Bar;

#[derive(Deserialize, Debug)]
pub struct AlpacaBar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
}

impl From<AlpacaBar> for Bar {
    /// Daily bars are stamped at the session's UTC midnight; the calendar day
    /// of that timestamp is the trading day.
    fn from(ab: AlpacaBar) -> Self {
        Bar {
            date: ab.timestamp.date_naive(),
            open: ab.open,
            high: ab.high,
            low: ab.low,
            close: ab.close,
            volume: ab.volume,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct AlpacaResponse {
    /// `null` or missing when no symbol has data in the range.
    #[serde(default)]
    pub bars: Option<IndexMap<String, Vec<AlpacaBar>>>,
    pub next_page_token: Option<String>,
}
