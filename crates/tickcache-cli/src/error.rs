use thiserror::Error;

use tickcache_core::{CacheError, ConfigError, FetchError, ValidationError};

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("command error: {0}")]
    Command(String),

    #[error("{failed} of {total} symbols failed")]
    PartialFailure { failed: usize, total: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Command(_) => 2,
            Self::Fetch(error) if error.is_validation() => 2,
            Self::Fetch(_) | Self::PartialFailure { .. } => 3,
            Self::Serialization(_) => 4,
            Self::Config(_) | Self::Cache(_) | Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tickcache_core::ProviderId;

    use super::*;

    #[test]
    fn fetch_errors_split_between_validation_and_failure() {
        let invalid = CliError::from(FetchError::InvalidParameters(String::from("bad combo")));
        assert_eq!(invalid.exit_code(), 2);

        let limited = CliError::from(FetchError::RateLimitExceeded {
            retry_after: Duration::from_secs(60),
        });
        assert_eq!(limited.exit_code(), 3);

        let down = CliError::from(FetchError::ProviderUnavailable {
            provider: ProviderId::Yahoo,
            cause: String::from("timed out"),
        });
        assert_eq!(down.exit_code(), 3);
    }

    #[test]
    fn environment_and_disk_problems_exit_with_ten() {
        let config = CliError::from(ConfigError::InvalidValue {
            name: "TICKCACHE_TIMEOUT_MS",
            value: String::from("0"),
            reason: String::from("timeout must be positive"),
        });
        assert_eq!(config.exit_code(), 10);
        assert_eq!(CliError::from(std::io::Error::other("disk full")).exit_code(), 10);
    }
}
