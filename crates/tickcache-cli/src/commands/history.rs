use tickcache_core::{FetchRequest, Fetcher};

use crate::cli::HistoryArgs;
use crate::error::CliError;

use super::{options, strategy, CommandResult};

pub async fn run(args: &HistoryArgs, fetcher: &Fetcher) -> Result<CommandResult, CliError> {
    let request = FetchRequest::new(
        args.symbol.as_str(),
        args.period.unwrap_or_else(|| fetcher.default_period()),
        args.interval.unwrap_or_else(|| fetcher.default_interval()),
    )
    .with_strategy(strategy(&args.flags));

    let fetched = fetcher
        .fetch_history(&request, options(&args.flags))
        .await?;
    Ok(CommandResult::ok(serde_json::to_value(&fetched)?))
}
