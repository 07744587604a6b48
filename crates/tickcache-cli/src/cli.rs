//! CLI argument definitions for tickcache.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `history` | Fetch OHLCV history for one symbol |
//! | `info` | Fetch a company profile |
//! | `quote` | Fetch the latest quote |
//! | `batch` | Fetch history for several symbols |
//! | `indicator` | Fetch a technical indicator (Alpha Vantage) |
//! | `search` | Look up tickers in the offline catalog |
//! | `usage` | Show per-provider call budgets |
//! | `cache` | Inspect or clear the local cache |
//!
//! # Examples
//!
//! ```bash
//! tickcache history AAPL --period 6mo --interval 1d --pretty
//! tickcache quote IBM --source alphavantage
//! tickcache batch AAPL MSFT GOOGL --period 1mo
//! tickcache indicator AAPL sma --time-period 50
//! tickcache cache clear AAPL
//! ```
//!
//! Configuration comes from `TICKCACHE_*` environment variables, optionally
//! loaded from a `.env` file in the working directory.

use clap::{Args, Parser, Subcommand, ValueEnum};
use tickcache_core::{
    Indicator, Interval, Period, ProviderId, SeriesType, SourceStrategy, DEFAULT_TIME_PERIOD,
};

#[derive(Debug, Parser)]
#[command(
    name = "tickcache",
    author,
    version,
    about = "Cached, rate-limited equity market data",
    long_about = "tickcache fetches price history, company profiles and quotes from Yahoo \
Finance and Alpha Vantage, keeping a local JSON cache so repeated requests cost no \
network calls and stay inside provider quotas.\n\
\n\
Set TICKCACHE_ALPHAVANTAGE_API_KEY to enable Alpha Vantage."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Provider selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceSelector {
    /// Yahoo Finance only.
    Yahoo,
    /// Alpha Vantage only (needs an API key).
    Alphavantage,
    /// Yahoo first, Alpha Vantage when Yahoo fails.
    Auto,
}

impl SourceSelector {
    pub fn strategy(self) -> SourceStrategy {
        match self {
            Self::Yahoo => SourceStrategy::Strict(ProviderId::Yahoo),
            Self::Alphavantage => SourceStrategy::Strict(ProviderId::Alphavantage),
            Self::Auto => SourceStrategy::Priority(vec![ProviderId::Yahoo, ProviderId::Alphavantage]),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch OHLCV history for one symbol.
    ///
    /// # Examples
    ///
    ///   tickcache history AAPL
    ///   tickcache history MSFT --period 5d --interval 15m
    ///   tickcache history IBM --source alphavantage --stale-ok
    History(HistoryArgs),

    /// Fetch a company profile.
    Info(SymbolArgs),

    /// Fetch the latest quote.
    Quote(SymbolArgs),

    /// Fetch history for several symbols; failures are reported per symbol.
    Batch(BatchArgs),

    /// Fetch a technical indicator computed by Alpha Vantage.
    ///
    /// # Examples
    ///
    ///   tickcache indicator AAPL sma --time-period 50
    ///   tickcache indicator MSFT macd --interval 1wk
    ///   tickcache indicator IBM rsi --interval 15m --time-period 14
    Indicator(IndicatorArgs),

    /// Look up tickers by symbol or company name. Works offline.
    Search(SearchArgs),

    /// Show call budgets consumed by this process.
    Usage,

    /// Cache management commands.
    Cache(CacheArgs),
}

/// Cache behavior shared by the fetching commands.
#[derive(Debug, Clone, Copy, Args)]
pub struct FetchFlags {
    /// Provider selection (default: yahoo).
    #[arg(long, value_enum)]
    pub source: Option<SourceSelector>,

    /// Ignore cached entries and refetch; the result is still cached.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// Serve an expired cache entry when the provider budget is spent.
    #[arg(long, default_value_t = false)]
    pub stale_ok: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Ticker symbol (e.g., AAPL, BRK.B).
    pub symbol: String,

    /// Lookback window: 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max.
    #[arg(long)]
    pub period: Option<Period>,

    /// Bar size: 1m, 2m, 5m, 15m, 30m, 60m, 90m, 1h, 1d, 5d, 1wk, 1mo, 3mo.
    #[arg(long)]
    pub interval: Option<Interval>,

    #[command(flatten)]
    pub flags: FetchFlags,
}

#[derive(Debug, Args)]
pub struct SymbolArgs {
    /// Ticker symbol.
    pub symbol: String,

    #[command(flatten)]
    pub flags: FetchFlags,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// One or more ticker symbols.
    #[arg(required = true, num_args = 1..)]
    pub symbols: Vec<String>,

    #[arg(long)]
    pub period: Option<Period>,

    #[arg(long)]
    pub interval: Option<Interval>,
}

#[derive(Debug, Args)]
pub struct IndicatorArgs {
    /// Ticker symbol.
    pub symbol: String,

    /// Indicator: sma, ema, wma, rsi, macd, bbands.
    pub indicator: Indicator,

    /// Bar size: 1m, 5m, 15m, 30m, 60m, 1h, 1d, 1wk, 1mo (default: 1d).
    #[arg(long)]
    pub interval: Option<Interval>,

    /// Number of bars in each indicator window.
    #[arg(long, default_value_t = DEFAULT_TIME_PERIOD)]
    pub time_period: u32,

    /// Price column to compute over: close, open, high, low.
    #[arg(long, default_value_t = SeriesType::Close)]
    pub series_type: SeriesType,

    /// Ignore cached entries and refetch; the result is still cached.
    #[arg(long, default_value_t = false)]
    pub refresh: bool,

    /// Serve an expired cache entry when the call budget is spent.
    #[arg(long, default_value_t = false)]
    pub stale_ok: bool,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Free-form query (symbol or company name).
    pub query: String,

    /// Maximum number of results to return.
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Remove cached entries, for one symbol or all of them.
    Clear {
        /// Only clear entries for this symbol.
        symbol: Option<String>,
    },
    /// Count cached entries and their size on disk.
    Stats,
}
