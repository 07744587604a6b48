mod batch;
mod cache;
mod history;
mod indicator;
mod info;
mod quote;
mod search;
mod usage;

use serde_json::Value;
use tickcache_core::{CacheMode, FetchOptions, Fetcher, FetcherConfig, SourceStrategy};
use tracing::debug;

use crate::cli::{Cli, Command, FetchFlags};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub failed: usize,
    pub total: usize,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            failed: 0,
            total: 1,
        }
    }

    pub fn with_failures(mut self, failed: usize, total: usize) -> Self {
        self.failed = failed;
        self.total = total;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let config = FetcherConfig::from_env()?;
    debug!(?config, "configuration loaded");
    let fetcher = Fetcher::builder(config).build()?;

    match &cli.command {
        Command::History(args) => history::run(args, &fetcher).await,
        Command::Info(args) => info::run(args, &fetcher).await,
        Command::Quote(args) => quote::run(args, &fetcher).await,
        Command::Batch(args) => batch::run(args, &fetcher).await,
        Command::Indicator(args) => indicator::run(args, &fetcher).await,
        Command::Search(args) => search::run(args, &fetcher),
        Command::Usage => usage::run(&fetcher),
        Command::Cache(args) => cache::run(args, &fetcher),
    }
}

fn strategy(flags: &FetchFlags) -> SourceStrategy {
    flags
        .source
        .map(|source| source.strategy())
        .unwrap_or_default()
}

fn options(flags: &FetchFlags) -> FetchOptions {
    let options = if flags.refresh {
        FetchOptions::default().with_cache_mode(CacheMode::Refresh)
    } else {
        FetchOptions::default()
    };
    if flags.stale_ok {
        options.allowing_stale()
    } else {
        options
    }
}
