use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Market data providers known to the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Unauthenticated feed; the default provider.
    Yahoo,
    /// Authenticated, quota-limited feed.
    Alphavantage,
}

impl ProviderId {
    pub const ALL: [Self; 2] = [Self::Yahoo, Self::Alphavantage];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Alphavantage => "alphavantage",
        }
    }

    pub const fn requires_api_key(self) -> bool {
        matches!(self, Self::Alphavantage)
    }
}

impl Default for ProviderId {
    fn default() -> Self {
        Self::Yahoo
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yahoo" => Ok(Self::Yahoo),
            "alphavantage" | "alpha_vantage" | "alpha-vantage" => Ok(Self::Alphavantage),
            other => Err(ValidationError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}
