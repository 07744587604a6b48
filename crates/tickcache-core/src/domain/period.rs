use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::{UtcDateTime, ValidationError};

/// Lookback window of a price history request, ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    Max,
}

impl Period {
    pub const ALL: [Self; 11] = [
        Self::OneDay,
        Self::FiveDays,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::OneYear,
        Self::TwoYears,
        Self::FiveYears,
        Self::TenYears,
        Self::YearToDate,
        Self::Max,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::TenYears => "10y",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }

    /// Approximate span in calendar days; `None` for `ytd` and `max`.
    pub const fn approx_days(self) -> Option<i64> {
        match self {
            Self::OneDay => Some(1),
            Self::FiveDays => Some(5),
            Self::OneMonth => Some(31),
            Self::ThreeMonths => Some(92),
            Self::SixMonths => Some(183),
            Self::OneYear => Some(366),
            Self::TwoYears => Some(731),
            Self::FiveYears => Some(1_827),
            Self::TenYears => Some(3_653),
            Self::YearToDate | Self::Max => None,
        }
    }

    /// Earliest instant covered by this period, or `None` when unbounded.
    ///
    /// Day-based periods are padded to whole calendar days so that a `1d`
    /// request made before the open still includes the previous session.
    pub fn window_start(self, now: UtcDateTime) -> Option<UtcDateTime> {
        let today = now.date();
        match self {
            Self::Max => None,
            Self::YearToDate => {
                let jan_first = Date::from_calendar_date(today.year(), Month::January, 1).ok()?;
                Some(UtcDateTime::start_of_day(jan_first))
            }
            Self::OneDay => Some(UtcDateTime::start_of_day(
                today.checked_sub(time::Duration::days(4))?,
            )),
            Self::FiveDays => Some(UtcDateTime::start_of_day(
                today.checked_sub(time::Duration::days(8))?,
            )),
            other => {
                let days = other.approx_days()?;
                Some(UtcDateTime::start_of_day(
                    today.checked_sub(time::Duration::days(days))?,
                ))
            }
        }
    }

    /// Whether this period can reach further back than `other`.
    ///
    /// `ytd` is ranked by its upper bound of one year.
    pub fn is_longer_than(self, other: Self) -> bool {
        self.upper_bound_days() > other.upper_bound_days()
    }

    fn upper_bound_days(self) -> i64 {
        match self {
            Self::YearToDate => 366,
            Self::Max => i64::MAX,
            other => other.approx_days().unwrap_or(i64::MAX),
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|period| period.as_str() == normalized)
            .ok_or(ValidationError::InvalidPeriod { value: normalized })
    }
}
