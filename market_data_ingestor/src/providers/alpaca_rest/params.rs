use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Alpaca caps a single page at 10 000 bars.
pub const MAX_PAGE_LIMIT: u32 = 10_000;

/// Specifies the corporate action adjustment for stock data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    Raw,
    Split,
    Dividend,
    #[default]
    All,
}

impl Adjustment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Adjustment::Raw => "raw",
            Adjustment::Split => "split",
            Adjustment::Dividend => "dividend",
            Adjustment::All => "all",
        }
    }
}

/// Specifies the source feed for stock data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    Sip,
    #[default]
    Iex,
    Otc,
}

impl Feed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Sip => "sip",
            Feed::Iex => "iex",
            Feed::Otc => "otc",
        }
    }
}

/// Alpaca-specific options for a daily bars request.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct AlpacaBarsParams {
    #[serde(default)]
    pub adjustment: Adjustment,
    #[serde(default)]
    pub feed: Feed,
    /// Page size; clamped to `1..=MAX_PAGE_LIMIT`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Builds the query string for one page of daily bars, oldest first.
///
/// `start` and `end` are inclusive calendar days and are sent as RFC-3339
/// midnight UTC timestamps (`end` is pushed to the last second of the day).
pub fn construct_params(
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    opts: &AlpacaBarsParams,
    page_token: Option<&str>,
) -> Vec<(String, String)> {
    let limit = opts.limit.unwrap_or(MAX_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let mut q = vec![
        ("symbols".to_string(), symbol.to_string()),
        ("timeframe".to_string(), "1Day".to_string()),
        ("start".to_string(), format!("{start}T00:00:00Z")),
        ("end".to_string(), format!("{end}T23:59:59Z")),
        ("adjustment".to_string(), opts.adjustment.as_str().to_string()),
        ("feed".to_string(), opts.feed.as_str().to_string()),
        ("limit".to_string(), limit.to_string()),
        ("sort".to_string(), "asc".to_string()),
    ];
    if let Some(token) = page_token {
        q.push(("page_token".to_string(), token.to_string()));
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(q: &'a [(String, String)], key: &str) -> Option<&'a str> {
        q.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn daily_query_defaults() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let q = construct_params("AAPL", start, end, &AlpacaBarsParams::default(), None);

        assert_eq!(get(&q, "timeframe"), Some("1Day"));
        assert_eq!(get(&q, "start"), Some("2024-01-02T00:00:00Z"));
        assert_eq!(get(&q, "end"), Some("2024-12-31T23:59:59Z"));
        assert_eq!(get(&q, "adjustment"), Some("all"));
        assert_eq!(get(&q, "feed"), Some("iex"));
        assert_eq!(get(&q, "limit"), Some("10000"));
        assert_eq!(get(&q, "page_token"), None);
    }

    #[test]
    fn page_token_and_limit_clamp() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let opts = AlpacaBarsParams {
            limit: Some(0),
            ..Default::default()
        };
        let q = construct_params("MSFT", day, day, &opts, Some("abc"));
        assert_eq!(get(&q, "limit"), Some("1"));
        assert_eq!(get(&q, "page_token"), Some("abc"));
    }
}
