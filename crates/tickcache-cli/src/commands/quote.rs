use tickcache_core::Fetcher;

use crate::cli::SymbolArgs;
use crate::error::CliError;

use super::{options, strategy, CommandResult};

pub async fn run(args: &SymbolArgs, fetcher: &Fetcher) -> Result<CommandResult, CliError> {
    let fetched = fetcher
        .fetch_quote(&args.symbol, &strategy(&args.flags), options(&args.flags))
        .await?;
    Ok(CommandResult::ok(serde_json::to_value(&fetched)?))
}
