use tickcache_core::{Fetcher, IndicatorRequest};

use crate::cli::{FetchFlags, IndicatorArgs};
use crate::error::CliError;

use super::{options, CommandResult};

pub async fn run(args: &IndicatorArgs, fetcher: &Fetcher) -> Result<CommandResult, CliError> {
    let request = IndicatorRequest::new(args.symbol.as_str(), args.indicator)
        .with_interval(args.interval.unwrap_or_else(|| fetcher.default_interval()))
        .with_time_period(args.time_period)
        .with_series_type(args.series_type);
    let flags = FetchFlags {
        source: None,
        refresh: args.refresh,
        stale_ok: args.stale_ok,
    };

    let fetched = fetcher.fetch_indicator(&request, options(&flags)).await?;
    Ok(CommandResult::ok(serde_json::to_value(&fetched)?))
}
