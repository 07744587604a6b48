use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// RFC3339 timestamp guaranteed to be UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| {
            ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            }
        })?;

        Self::from_offset_datetime(parsed).map_err(|_| ValidationError::TimestampNotUtc {
            value: input.to_owned(),
        })
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Result<Self, ValidationError> {
        if value.offset() != UtcOffset::UTC {
            return Err(ValidationError::TimestampNotUtc {
                value: value
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| String::from("<unformattable>")),
            });
        }

        Ok(Self(value))
    }

    pub fn from_unix_timestamp(seconds: i64) -> Result<Self, ValidationError> {
        OffsetDateTime::from_unix_timestamp(seconds)
            .map(Self)
            .map_err(|_| ValidationError::TimestampNotUtc {
                value: seconds.to_string(),
            })
    }

    /// Midnight UTC at the start of `date`.
    pub fn start_of_day(date: Date) -> Self {
        Self(date.midnight().assume_utc())
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn date(self) -> Date {
        self.0.date()
    }

    pub fn unix_timestamp(self) -> i64 {
        self.0.unix_timestamp()
    }

    /// Saturating add; out-of-range results clamp to the input.
    pub fn plus(self, duration: std::time::Duration) -> Self {
        self.0
            .checked_add(time::Duration::try_from(duration).unwrap_or(time::Duration::ZERO))
            .map(Self)
            .unwrap_or(self)
    }

    /// Elapsed time from `earlier` to `self`, zero when `earlier` is in the future.
    pub fn since(self, earlier: Self) -> std::time::Duration {
        std::time::Duration::try_from(self.0 - earlier.0).unwrap_or(std::time::Duration::ZERO)
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn parses_utc_timestamp() {
        let parsed = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("must parse");
        assert_eq!(parsed.format_rfc3339(), "2024-01-01T00:00:00Z");
    }

    #[test]
    fn rejects_non_utc_timestamp() {
        let err = UtcDateTime::parse("2024-01-01T01:00:00+01:00").expect_err("must fail");
        assert!(matches!(err, ValidationError::TimestampNotUtc { .. }));
    }

    #[test]
    fn since_is_zero_for_future_instants() {
        let earlier = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("must parse");
        let later = earlier.plus(Duration::from_secs(90));

        assert_eq!(later.since(earlier), Duration::from_secs(90));
        assert_eq!(earlier.since(later), Duration::ZERO);
    }
}
