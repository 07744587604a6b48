use serde::Serialize;
use serde_json::{Map, Value};
use tickcache_core::{Fetcher, Interval, Period};

use crate::cli::BatchArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct BatchResponseData {
    period: Period,
    interval: Interval,
    results: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct SymbolFailure {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct FailedEntry {
    error: SymbolFailure,
}

pub async fn run(args: &BatchArgs, fetcher: &Fetcher) -> Result<CommandResult, CliError> {
    let period = args.period.unwrap_or_else(|| fetcher.default_period());
    let interval = args.interval.unwrap_or_else(|| fetcher.default_interval());

    let outcomes = fetcher.get_multiple(args.symbols.as_slice(), period, interval).await;

    let total = outcomes.len();
    let mut failed = 0;
    let mut results = Map::new();
    for (symbol, outcome) in outcomes {
        let value = match outcome {
            Ok(fetched) => serde_json::to_value(&fetched)?,
            Err(error) => {
                failed += 1;
                serde_json::to_value(FailedEntry {
                    error: SymbolFailure {
                        code: error.code(),
                        message: error.to_string(),
                    },
                })?
            }
        };
        results.insert(symbol, value);
    }

    let data = serde_json::to_value(BatchResponseData {
        period,
        interval,
        results,
    })?;
    Ok(CommandResult::ok(data).with_failures(failed, total))
}
