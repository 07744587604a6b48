use serde::Serialize;
use tickcache_core::{Fetcher, Symbol};

use crate::cli::{CacheArgs, CacheCommand};
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct ClearResponseData {
    symbol: Option<Symbol>,
    removed: usize,
}

#[derive(Debug, Serialize)]
struct StatsResponseData {
    dir: String,
    entries: usize,
    bytes: u64,
}

pub fn run(args: &CacheArgs, fetcher: &Fetcher) -> Result<CommandResult, CliError> {
    let data = match &args.command {
        CacheCommand::Clear { symbol } => {
            let symbol = symbol.as_deref().map(Symbol::parse).transpose()?;
            let removed = fetcher.clear_cache(symbol.as_ref())?;
            serde_json::to_value(ClearResponseData { symbol, removed })?
        }
        CacheCommand::Stats => {
            let stats = fetcher.cache_stats()?;
            serde_json::to_value(StatsResponseData {
                dir: fetcher.cache().dir().display().to_string(),
                entries: stats.entries,
                bytes: stats.bytes,
            })?
        }
    };
    Ok(CommandResult::ok(data))
}
