//! Durability of the resolution cache log: reopen, corruption, locking, compaction.

use chemlink_core::{
    CacheOptions, ChemicalRecord, ChemlinkError, ResolutionCache, ResolutionEntry, ResolutionSource,
    ResolutionStatus,
};
use tempfile::TempDir;

fn resolved(query: &str, id: &str) -> ResolutionEntry {
    ResolutionEntry::resolved(query, &ChemicalRecord::new(id, query), ResolutionSource::ExternalApi)
}

#[test]
fn entries_and_invalidations_replay_in_order() {
    let dir = TempDir::new().expect("tmp");
    let path = dir.path().join("cache.log");
    {
        let cache = ResolutionCache::open(&path).expect("open");
        cache.put(resolved("zinc oxide", "14806")).expect("put");
        cache.put(resolved("water", "962")).expect("put");
        cache
            .put(ResolutionEntry::unresolved("unobtainium", ResolutionSource::ExternalApi))
            .expect("put");
        assert!(cache.invalidate("water").expect("invalidate"));
        assert!(!cache.invalidate("never cached").expect("noop"));
    }

    let cache = ResolutionCache::open(&path).expect("reopen");
    assert_eq!(cache.len(), 2);
    assert_eq!(
        cache.get("zinc oxide").and_then(|e| e.identifier),
        Some("14806".to_string())
    );
    assert!(cache.get("water").is_none());
    assert_eq!(
        cache.get("unobtainium").map(|e| e.status),
        Some(ResolutionStatus::Unresolved)
    );
    let stats = cache.stats();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.corrupt_records, 0);
}

#[test]
fn repeated_identical_puts_do_not_grow_the_log() {
    let dir = TempDir::new().expect("tmp");
    let cache = ResolutionCache::open(&dir.path().join("cache.log")).expect("open");
    cache.put(resolved("zinc oxide", "14806")).expect("put");
    let after_first = cache.stats().log_bytes;
    for _ in 0..5 {
        cache.put(resolved("zinc oxide", "14806")).expect("put");
    }
    assert_eq!(cache.stats().log_bytes, after_first);
    assert_eq!(cache.stats().appends, 1);
}

#[test]
fn flipped_payload_byte_skips_only_that_record() {
    let dir = TempDir::new().expect("tmp");
    let path = dir.path().join("cache.log");
    let first_len = {
        let cache = ResolutionCache::open(&path).expect("open");
        cache.put(resolved("zinc oxide", "14806")).expect("put");
        let first_len = cache.stats().log_bytes;
        cache.put(resolved("water", "962")).expect("put");
        first_len
    };

    let mut bytes = std::fs::read(&path).expect("read");
    // Last payload byte of the first record.
    let target = usize::try_from(first_len).expect("fits") - 1;
    bytes[target] ^= 0x5A;
    std::fs::write(&path, &bytes).expect("write");

    let cache = ResolutionCache::open(&path).expect("reopen");
    assert!(cache.get("zinc oxide").is_none());
    assert_eq!(cache.get("water").and_then(|e| e.identifier), Some("962".into()));
    assert_eq!(cache.stats().corrupt_records, 1);
}

#[test]
fn torn_final_write_is_dropped_and_log_stays_appendable() {
    let dir = TempDir::new().expect("tmp");
    let path = dir.path().join("cache.log");
    {
        let cache = ResolutionCache::open(&path).expect("open");
        cache.put(resolved("zinc oxide", "14806")).expect("put");
    }
    let intact = std::fs::metadata(&path).expect("meta").len();
    let mut bytes = std::fs::read(&path).expect("read");
    let garbage: Vec<u8> = (0..fastrand::usize(1..39)).map(|_| fastrand::u8(..)).collect();
    bytes.extend_from_slice(&garbage);
    std::fs::write(&path, &bytes).expect("write");

    {
        let cache = ResolutionCache::open(&path).expect("reopen");
        assert_eq!(cache.len(), 1);
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), intact);
        cache.put(resolved("water", "962")).expect("append after repair");
    }
    let cache = ResolutionCache::open(&path).expect("third open");
    assert_eq!(cache.len(), 2);
}

#[test]
fn second_writer_is_refused() {
    let dir = TempDir::new().expect("tmp");
    let path = dir.path().join("cache.log");
    let _owner = ResolutionCache::open(&path).expect("first");
    let err = ResolutionCache::open(&path).expect_err("locked");
    assert!(matches!(err, ChemlinkError::Lock(_)), "got {err:?}");
}

#[test]
fn compaction_keeps_live_entries_only() {
    let dir = TempDir::new().expect("tmp");
    let path = dir.path().join("cache.log");
    {
        let cache = ResolutionCache::open_with_options(&path, CacheOptions { skip_sync: true })
            .expect("open");
        for round in 0..20 {
            cache
                .put(resolved("alumina", &format!("ID-{round}")))
                .expect("put");
        }
        cache.put(resolved("zinc oxide", "14806")).expect("put");
        cache.invalidate("zinc oxide").expect("invalidate");
        let before = cache.stats().log_bytes;
        cache.compact().expect("compact");
        assert!(cache.stats().log_bytes < before);
        cache.put(resolved("water", "962")).expect("put after compaction");
        cache.flush().expect("flush");
    }

    let cache = ResolutionCache::open(&path).expect("reopen");
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.get("alumina").and_then(|e| e.identifier), Some("ID-19".into()));
    assert!(cache.get("zinc oxide").is_none());
    assert_eq!(cache.path().as_deref(), Some(path.as_path()));
}
