use serde::Serialize;
use tickcache_core::{Fetcher, SymbolMatch};

use crate::cli::SearchArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct SearchResponseData<'a> {
    query: &'a str,
    results: Vec<SymbolMatch>,
}

pub fn run(args: &SearchArgs, fetcher: &Fetcher) -> Result<CommandResult, CliError> {
    if args.limit == 0 {
        return Err(CliError::Command(String::from(
            "--limit must be greater than zero",
        )));
    }

    let query = args.query.trim();
    if query.is_empty() {
        return Err(CliError::Command(String::from("query must not be empty")));
    }

    let data = serde_json::to_value(SearchResponseData {
        query,
        results: fetcher.search_symbols(query, args.limit),
    })?;
    Ok(CommandResult::ok(data))
}
