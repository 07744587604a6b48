use serde::Serialize;
use tickcache_core::{Fetcher, ProviderId, RateUsage};

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct UsageResponseData {
    providers: Vec<RateUsage>,
}

/// Budgets are tracked per process, so this mostly reports the configured
/// limits.
pub fn run(fetcher: &Fetcher) -> Result<CommandResult, CliError> {
    let providers = ProviderId::ALL
        .iter()
        .map(|provider| fetcher.rate_usage(*provider))
        .collect();
    Ok(CommandResult::ok(serde_json::to_value(UsageResponseData {
        providers,
    })?))
}
