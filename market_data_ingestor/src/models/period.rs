//! Look-back periods for daily history requests.
//!
//! A [`Period`] is what a caller asks a source for (`"1y"`, `"6mo"`, `"ytd"`, `"max"`);
//! [`Period::start_date`] resolves it to an inclusive first calendar day relative to
//! "today". Sources return every trading day from that date through today.
//!
//! ```
//! use chrono::NaiveDate;
//! use market_data_ingestor::models::period::Period;
//!
//! let p: Period = "6mo".parse().unwrap();
//! let today = NaiveDate::from_ymd_opt(2024, 8, 31).unwrap();
//! assert_eq!(p.start_date(today), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
//! assert_eq!(p.to_string(), "6mo");
//! ```

use std::{fmt, num::NonZeroU32, str::FromStr};

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("empty period")]
    Empty,

    #[error("invalid period '{0}' (expected e.g. 1mo, 6mo, 1y, 5y, ytd, max)")]
    Invalid(String),
}

/// How far back a history request reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Period {
    /// `<n>mo` calendar months.
    Months(NonZeroU32),
    /// `<n>y` calendar years.
    Years(NonZeroU32),
    /// Since January 1st of the current year.
    YearToDate,
    /// Everything the source has.
    Max,
}

impl Period {
    /// Inclusive first day covered by this period, counted back from `today`.
    ///
    /// Month arithmetic clamps to the end of shorter months (Aug 31 minus 6 months
    /// is Feb 29 in a leap year).
    pub fn start_date(&self, today: NaiveDate) -> NaiveDate {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
        let months_back = match self {
            Period::Months(n) => n.get(),
            Period::Years(n) => n.get().saturating_mul(12),
            Period::YearToDate => {
                return NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
            }
            Period::Max => return epoch,
        };
        today
            .checked_sub_months(Months::new(months_back))
            .map_or(epoch, |d| d.max(epoch))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Months(n) => write!(f, "{n}mo"),
            Period::Years(n) => write!(f, "{n}y"),
            Period::YearToDate => f.write_str("ytd"),
            Period::Max => f.write_str("max"),
        }
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s.is_empty() {
            return Err(PeriodError::Empty);
        }
        match s.as_str() {
            "ytd" => return Ok(Period::YearToDate),
            "max" => return Ok(Period::Max),
            _ => {}
        }

        let invalid = || PeriodError::Invalid(s.clone());
        let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        let (digits, unit) = s.split_at(split);
        let amount: u32 = digits.parse().map_err(|_| invalid())?;
        let amount = NonZeroU32::new(amount).ok_or_else(invalid)?;
        match unit {
            "mo" => Ok(Period::Months(amount)),
            "y" => Ok(Period::Years(amount)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}
