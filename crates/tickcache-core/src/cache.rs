//! On-disk response cache.
//!
//! One JSON document per key under the cache directory (`{dir}/{key}.json`).
//! Writes go to a temp file in the same directory and are renamed into place,
//! so readers never observe a half-written entry. Entries that fail to decode
//! are deleted and reported as [`CacheLookup::Corrupt`]; callers treat that as
//! a miss.

use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{system_clock, Clock};
use crate::provider::IndicatorQuery;
use crate::{
    CompanyInfo, IndicatorSeries, Interval, Period, PriceRow, PriceSeries, ProviderId, Quote,
    Symbol, UtcDateTime,
};

const ENTRY_EXTENSION: &str = "json";

/// Per-call cache behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Serve fresh entries; write fetched data through. (Default)
    #[default]
    Use,
    /// Skip the read, still write the fetched data.
    Refresh,
    /// Neither read nor write.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        !matches!(self, Self::Bypass)
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode cache entry '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Deterministic entry name. History keys for the default provider omit the
/// provider suffix: `AAPL_1mo_1d` vs `AAPL_1mo_1d_alphavantage`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn history(symbol: &Symbol, period: Period, interval: Interval, provider: ProviderId) -> Self {
        Self::with_provider(format!("{symbol}_{period}_{interval}"), provider)
    }

    pub fn info(symbol: &Symbol, provider: ProviderId) -> Self {
        Self::with_provider(format!("{symbol}_info"), provider)
    }

    pub fn quote(symbol: &Symbol, provider: ProviderId) -> Self {
        Self::with_provider(format!("{symbol}_quote"), provider)
    }

    /// `{symbol}_{indicator}_{time_period}_{interval}_{series_type}`.
    pub fn indicator(query: &IndicatorQuery, provider: ProviderId) -> Self {
        Self::with_provider(
            format!(
                "{}_{}_{}_{}_{}",
                query.symbol, query.indicator, query.time_period, query.interval, query.series_type
            ),
            provider,
        )
    }

    fn with_provider(base: String, provider: ProviderId) -> Self {
        if provider == ProviderId::default() {
            Self(base)
        } else {
            Self(format!("{base}_{provider}"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn file_name(&self) -> String {
        format!("{}.{ENTRY_EXTENSION}", self.0)
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Price history laid out one array per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTable {
    pub symbol: Symbol,
    pub period: Period,
    pub interval: Interval,
    pub provider: ProviderId,
    pub date: Vec<UtcDateTime>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<u64>,
}

impl HistoryTable {
    pub fn from_series(series: &PriceSeries) -> Self {
        let rows = &series.rows;
        Self {
            symbol: series.symbol.clone(),
            period: series.period,
            interval: series.interval,
            provider: series.provider,
            date: rows.iter().map(|row| row.date).collect(),
            open: rows.iter().map(|row| row.open).collect(),
            high: rows.iter().map(|row| row.high).collect(),
            low: rows.iter().map(|row| row.low).collect(),
            close: rows.iter().map(|row| row.close).collect(),
            volume: rows.iter().map(|row| row.volume).collect(),
        }
    }

    /// Rebuilds the row view. Fails when the columns disagree on length or
    /// hold non-finite prices.
    pub fn to_series(&self) -> Result<PriceSeries, String> {
        let len = self.date.len();
        let columns = [
            ("open", self.open.len()),
            ("high", self.high.len()),
            ("low", self.low.len()),
            ("close", self.close.len()),
            ("volume", self.volume.len()),
        ];
        if let Some((name, other)) = columns.iter().find(|(_, other)| *other != len) {
            return Err(format!(
                "column '{name}' has {other} values but 'date' has {len}"
            ));
        }

        let rows = (0..len)
            .map(|index| {
                PriceRow::new(
                    self.date[index],
                    self.open[index],
                    self.high[index],
                    self.low[index],
                    self.close[index],
                    self.volume[index],
                )
                .map_err(|error| format!("row {index}: {error}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PriceSeries {
            symbol: self.symbol.clone(),
            period: self.period,
            interval: self.interval,
            provider: self.provider,
            rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum CachePayload {
    History(HistoryTable),
    Info(CompanyInfo),
    Quote(Quote),
    Indicator(IndicatorSeries),
}

impl CachePayload {
    pub fn history(series: &PriceSeries) -> Self {
        Self::History(HistoryTable::from_series(series))
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::History(_) => "history",
            Self::Info(_) => "info",
            Self::Quote(_) => "quote",
            Self::Indicator(_) => "indicator",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub created_at: UtcDateTime,
    pub payload: CachePayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Missing,
    /// The entry existed but could not be used; it has been removed.
    Corrupt(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
}

/// File-per-key cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Opens (and creates if needed) the cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::open_with_clock(dir, system_clock())
    }

    pub fn open_with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|error| CacheError::io(&dir, error))?;
        Ok(Self { dir, clock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn lookup(&self, key: &CacheKey) -> CacheLookup {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return CacheLookup::Missing,
            Err(error) => return self.discard(key, &path, format!("unreadable: {error}")),
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(error) => return self.discard(key, &path, format!("undecodable: {error}")),
        };

        if entry.key != key.as_str() {
            let reason = format!("entry is stamped with key '{}'", entry.key);
            return self.discard(key, &path, reason);
        }

        if let CachePayload::History(table) = &entry.payload {
            if let Err(reason) = table.to_series() {
                return self.discard(key, &path, reason);
            }
        }

        debug!(key = %key, created_at = %entry.created_at, "cache entry loaded");
        CacheLookup::Hit(entry)
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        match self.lookup(key) {
            CacheLookup::Hit(entry) => Some(entry),
            CacheLookup::Missing | CacheLookup::Corrupt(_) => None,
        }
    }

    pub fn is_fresh(&self, entry: &CacheEntry, max_age: Duration) -> bool {
        self.clock.now().since(entry.created_at) <= max_age
    }

    /// Writes `payload` under `key`, replacing any previous entry atomically.
    pub fn store(&self, key: &CacheKey, payload: CachePayload) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry {
            key: key.as_str().to_owned(),
            created_at: self.clock.now(),
            payload,
        };
        let bytes = serde_json::to_vec(&entry).map_err(|source| CacheError::Encode {
            key: key.as_str().to_owned(),
            source,
        })?;

        let path = self.path_for(key);
        let mut staged = tempfile::Builder::new()
            .prefix(".")
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|error| CacheError::io(&self.dir, error))?;
        staged
            .write_all(&bytes)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|error| CacheError::io(staged.path(), error))?;
        staged
            .persist(&path)
            .map_err(|error| CacheError::io(&path, error.error))?;

        debug!(key = %key, bytes = bytes.len(), kind = entry.payload.kind(), "cache entry written");
        Ok(entry)
    }

    pub fn delete(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(CacheError::io(&path, error)),
        }
    }

    /// Removes every entry; returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        self.remove_matching(|_| true)
    }

    /// Removes every entry whose key belongs to `symbol`.
    pub fn clear_symbol(&self, symbol: &Symbol) -> Result<usize, CacheError> {
        let prefix = format!("{symbol}_");
        self.remove_matching(|stem| stem.starts_with(&prefix))
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        for path in self.entry_paths()? {
            let metadata = fs::metadata(&path).map_err(|error| CacheError::io(&path, error))?;
            stats.entries += 1;
            stats.bytes += metadata.len();
        }
        Ok(stats)
    }

    fn remove_matching(&self, mut matches_stem: impl FnMut(&str) -> bool) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_paths()? {
            let matches = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(&mut matches_stem);
            if !matches {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => return Err(CacheError::io(&path, error)),
            }
        }
        Ok(removed)
    }

    fn entry_paths(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = fs::read_dir(&self.dir).map_err(|error| CacheError::io(&self.dir, error))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| CacheError::io(&self.dir, error))?;
            let path = entry.path();
            let is_entry = path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION)
                && !path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with('.'));
            if is_entry {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn discard(&self, key: &CacheKey, path: &Path, reason: String) -> CacheLookup {
        warn!(key = %key, reason = %reason, "discarding corrupt cache entry");
        if let Err(error) = fs::remove_file(path) {
            if error.kind() != ErrorKind::NotFound {
                warn!(key = %key, error = %error, "failed to remove corrupt cache entry");
            }
        }
        CacheLookup::Corrupt(reason)
    }
}
