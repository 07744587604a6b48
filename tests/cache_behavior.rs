//! Behavior tests for the on-disk cache.
//!
//! Entries are exercised through the public `CacheStore` API only; file
//! contents are inspected where the on-disk contract matters.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use tickcache_core::{
    CacheKey, CacheLookup, CachePayload, CacheStore, CompanyInfo, Interval, ManualClock, Period,
    PriceRow, PriceSeries, ProviderId, Quote, Symbol, UtcDateTime,
};

fn ts(value: &str) -> UtcDateTime {
    UtcDateTime::parse(value).expect("timestamp")
}

fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).expect("valid symbol")
}

fn series(raw: &str) -> PriceSeries {
    let rows = [
        ("2024-02-28T00:00:00Z", 181.42),
        ("2024-02-29T00:00:00Z", 180.75),
        ("2024-03-01T00:00:00Z", 179.66),
    ]
    .into_iter()
    .map(|(date, close)| {
        PriceRow::new(ts(date), close - 0.5, close + 1.0, close - 1.0, close, 52_000_000)
            .expect("row")
    })
    .collect();

    PriceSeries::normalized(
        symbol(raw),
        Period::OneMonth,
        Interval::OneDay,
        ProviderId::Yahoo,
        rows,
    )
}

fn store() -> (tempfile::TempDir, CacheStore, ManualClock) {
    let dir = tempfile::tempdir().expect("tempdir");
    let clock = ManualClock::new(ts("2024-03-04T15:00:00Z"));
    let store = CacheStore::open_with_clock(dir.path().join("nested/cache"), Arc::new(clock.clone()))
        .expect("open cache");
    (dir, store, clock)
}

fn history_key(raw: &str) -> CacheKey {
    CacheKey::history(&symbol(raw), Period::OneMonth, Interval::OneDay, ProviderId::Yahoo)
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn when_history_is_stored_system_reads_back_identical_rows() {
    // Given: a fresh cache directory that does not exist yet
    let (_dir, store, _clock) = store();
    assert!(store.dir().is_dir());
    let original = series("AAPL");

    // When: the series is stored and read back
    store
        .store(&history_key("AAPL"), CachePayload::history(&original))
        .expect("store");
    let entry = store.get(&history_key("AAPL")).expect("hit");

    // Then: the columnar payload rebuilds the same series
    let CachePayload::History(table) = entry.payload else {
        panic!("expected history payload");
    };
    assert_eq!(table.to_series().expect("valid table"), original);
    assert_eq!(entry.created_at, ts("2024-03-04T15:00:00Z"));
}

/// Price as a feed that quotes in single precision reports it once widened
/// to `f64`: 16 or 17 significant digits.
fn widened_price(step: u32, offset: f32) -> f64 {
    f64::from(9_000.0_f32 + offset + step as f32 * 0.731_f32)
}

#[test]
fn when_prices_carry_full_precision_system_reads_back_exact_bits() {
    // Given: a long series of single-precision prices widened to f64
    let (_dir, store, _clock) = store();
    let start = ts("2000-01-03T00:00:00Z");
    let rows = (0..2_000_u32)
        .map(|step| {
            let close = widened_price(step, 0.0);
            PriceRow::new(
                start.plus(Duration::from_secs(u64::from(step) * 24 * 60 * 60)),
                widened_price(step, -0.37),
                widened_price(step, 1.13),
                widened_price(step, -1.29),
                close,
                u64::from(step) * 1_000 + 17,
            )
            .expect("row")
        })
        .collect();
    let original = PriceSeries::normalized(
        symbol("AAPL"),
        Period::Max,
        Interval::OneDay,
        ProviderId::Yahoo,
        rows,
    );
    let key = CacheKey::history(&symbol("AAPL"), Period::Max, Interval::OneDay, ProviderId::Yahoo);

    // When: it goes through the cache
    store
        .store(&key, CachePayload::history(&original))
        .expect("store");
    let CacheLookup::Hit(entry) = store.lookup(&key) else {
        panic!("expected a cache hit");
    };
    let CachePayload::History(table) = entry.payload else {
        panic!("expected history payload");
    };
    let restored = table.to_series().expect("valid table");

    // Then: every field of every row is bit-for-bit identical
    assert_eq!(restored.len(), 2_000);
    for (before, after) in original.rows.iter().zip(&restored.rows) {
        assert_eq!(before.date, after.date);
        for (field, stored, loaded) in [
            ("open", before.open, after.open),
            ("high", before.high, after.high),
            ("low", before.low, after.low),
            ("close", before.close, after.close),
        ] {
            assert_eq!(
                stored.to_bits(),
                loaded.to_bits(),
                "{field} at {}: {stored} came back as {loaded}",
                before.date
            );
        }
        assert_eq!(before.volume, after.volume);
    }
}

#[test]
fn when_info_and_quote_are_stored_system_keeps_them_under_separate_keys() {
    let (_dir, store, _clock) = store();
    let ibm = symbol("IBM");
    let mut info = CompanyInfo::empty(ibm.clone());
    info.name = Some(String::from("International Business Machines"));
    info.market_cap = Some(1.7e11);
    let quote = Quote::new(ibm.clone(), 185.25, ts("2024-03-04T15:00:00Z")).expect("quote");

    store
        .store(&CacheKey::info(&ibm, ProviderId::Yahoo), CachePayload::Info(info.clone()))
        .expect("store info");
    store
        .store(
            &CacheKey::quote(&ibm, ProviderId::Alphavantage),
            CachePayload::Quote(quote.clone()),
        )
        .expect("store quote");

    assert_eq!(
        store.get(&CacheKey::info(&ibm, ProviderId::Yahoo)).map(|entry| entry.payload),
        Some(CachePayload::Info(info))
    );
    assert_eq!(
        store
            .get(&CacheKey::quote(&ibm, ProviderId::Alphavantage))
            .map(|entry| entry.payload),
        Some(CachePayload::Quote(quote))
    );
    assert!(store.path_for(&CacheKey::info(&ibm, ProviderId::Yahoo)).ends_with("IBM_info.json"));
    assert!(store
        .path_for(&CacheKey::quote(&ibm, ProviderId::Alphavantage))
        .ends_with("IBM_quote_alphavantage.json"));
}

#[test]
fn when_entry_is_overwritten_system_keeps_latest_and_leaves_no_temp_files() {
    let (_dir, store, clock) = store();
    let key = history_key("MSFT");

    store.store(&key, CachePayload::history(&series("MSFT"))).expect("store");
    clock.advance(Duration::from_secs(3600));
    store.store(&key, CachePayload::history(&series("MSFT"))).expect("store");

    let entry = store.get(&key).expect("hit");
    assert_eq!(entry.created_at, ts("2024-03-04T16:00:00Z"));

    let names: Vec<String> = fs::read_dir(store.dir())
        .expect("read dir")
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    assert_eq!(names, vec![String::from("MSFT_1mo_1d.json")]);
}

// =============================================================================
// Freshness
// =============================================================================

#[test]
fn when_entry_ages_past_max_age_system_reports_it_stale() {
    let (_dir, store, clock) = store();
    let entry = store
        .store(&history_key("AAPL"), CachePayload::history(&series("AAPL")))
        .expect("store");

    clock.advance(Duration::from_secs(24 * 3600));
    assert!(store.is_fresh(&entry, Duration::from_secs(24 * 3600)));

    clock.advance(Duration::from_secs(1));
    assert!(!store.is_fresh(&entry, Duration::from_secs(24 * 3600)));
}

// =============================================================================
// Corruption
// =============================================================================

#[test]
fn when_entry_is_truncated_system_reports_corrupt_once_then_missing() {
    let (_dir, store, _clock) = store();
    let key = history_key("AAPL");
    let path = store.path_for(&key);
    store.store(&key, CachePayload::history(&series("AAPL"))).expect("store");

    let bytes = fs::read(&path).expect("read");
    fs::write(&path, &bytes[..bytes.len() / 2]).expect("truncate");

    assert!(matches!(store.lookup(&key), CacheLookup::Corrupt(_)));
    assert!(!path.exists());
    assert_eq!(store.lookup(&key), CacheLookup::Missing);
}

#[test]
fn when_columns_disagree_on_length_system_rejects_entry() {
    let (_dir, store, _clock) = store();
    let key = history_key("AAPL");
    let mut table = tickcache_core::HistoryTable::from_series(&series("AAPL"));
    table.volume.pop();
    store.store(&key, CachePayload::History(table)).expect("store");

    match store.lookup(&key) {
        CacheLookup::Corrupt(reason) => assert!(reason.contains("volume")),
        other => panic!("unexpected lookup: {other:?}"),
    }
}

#[test]
fn when_file_is_stamped_with_another_key_system_rejects_it() {
    let (_dir, store, _clock) = store();
    store
        .store(&history_key("AAPL"), CachePayload::history(&series("AAPL")))
        .expect("store");
    fs::copy(
        store.path_for(&history_key("AAPL")),
        store.path_for(&history_key("MSFT")),
    )
    .expect("copy");

    assert!(matches!(store.lookup(&history_key("MSFT")), CacheLookup::Corrupt(_)));
    assert!(matches!(store.lookup(&history_key("AAPL")), CacheLookup::Hit(_)));
}

// =============================================================================
// Administration
// =============================================================================

#[test]
fn when_clearing_a_symbol_system_leaves_similar_prefixes_alone() {
    let (_dir, store, _clock) = store();
    for raw in ["AA", "AAPL"] {
        let sym = symbol(raw);
        store
            .store(&history_key(raw), CachePayload::history(&series(raw)))
            .expect("store");
        store
            .store(
                &CacheKey::quote(&sym, ProviderId::Yahoo),
                CachePayload::Quote(Quote::new(sym.clone(), 10.0, ts("2024-03-04T15:00:00Z")).expect("quote")),
            )
            .expect("store");
    }

    assert_eq!(store.clear_symbol(&symbol("AA")).expect("clear"), 2);
    assert_eq!(store.stats().expect("stats").entries, 2);
    assert!(store.get(&history_key("AAPL")).is_some());
}

#[test]
fn when_stats_are_requested_system_counts_entries_and_bytes() {
    let (_dir, store, _clock) = store();
    assert_eq!(store.stats().expect("stats").entries, 0);

    store
        .store(&history_key("AAPL"), CachePayload::history(&series("AAPL")))
        .expect("store");
    fs::write(store.dir().join("notes.txt"), b"ignored").expect("write");

    let stats = store.stats().expect("stats");
    let on_disk = fs::metadata(store.path_for(&history_key("AAPL")))
        .expect("metadata")
        .len();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.bytes, on_disk);

    assert!(store.delete(&history_key("AAPL")).expect("delete"));
    assert!(!store.delete(&history_key("AAPL")).expect("delete"));
    assert_eq!(store.clear().expect("clear"), 0);
}
