//! Persistent normalized-query → resolution cache.
//!
//! Every resolution outcome, including unresolved and ambiguous ones, is
//! appended to a checksummed log so repeated names never reach the external
//! API twice. The whole log is replayed into memory on open; there is no
//! eviction. Entries are only removed through [`ResolutionCache::invalidate`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{ChemlinkError, Result};
use crate::io::journal::Journal;
use crate::record_config;
use crate::types::{CacheOptions, ResolutionEntry};

/// Payload of one journal record.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum CacheRecord {
    Put(ResolutionEntry),
    Invalidate { query: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    /// Records appended since open or the last compaction.
    pub appends: u64,
    /// Records skipped on load because they failed checksum or decoding.
    pub corrupt_records: u64,
    pub log_bytes: u64,
}

#[derive(Debug)]
pub struct ResolutionCache {
    entries: RwLock<HashMap<String, ResolutionEntry>>,
    journal: Option<Mutex<Journal>>,
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt_records: u64,
}

impl ResolutionCache {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_options(path, CacheOptions::default())
    }

    #[tracing::instrument(skip(options), fields(cache = %path.display()))]
    pub fn open_with_options(path: &Path, options: CacheOptions) -> Result<Self> {
        let (journal, outcome) = Journal::open(path, options.skip_sync)?;
        let mut corrupt_records = outcome.corrupt.len() as u64;
        for err in &outcome.corrupt {
            tracing::warn!(error = %err, "skipping corrupt resolution cache record");
        }

        let mut entries = HashMap::new();
        for record in outcome.records {
            match bincode::serde::decode_from_slice::<CacheRecord, _>(&record.payload, record_config()) {
                Ok((CacheRecord::Put(entry), _)) => {
                    entries.insert(entry.query.clone(), entry);
                }
                Ok((CacheRecord::Invalidate { query }, _)) => {
                    entries.remove(&query);
                }
                Err(err) => {
                    corrupt_records += 1;
                    tracing::warn!(
                        offset = record.offset,
                        error = %err,
                        "skipping undecodable resolution cache record"
                    );
                }
            }
        }
        tracing::info!(
            entries = entries.len(),
            corrupt = corrupt_records,
            truncated_bytes = outcome.truncated_bytes,
            "resolution cache loaded"
        );

        Ok(Self {
            entries: RwLock::new(entries),
            journal: Some(Mutex::new(journal)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            corrupt_records,
        })
    }

    /// A cache that lives only as long as the process.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            journal: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            corrupt_records: 0,
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.journal.as_ref().map(|journal| {
            journal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .path()
                .to_path_buf()
        })
    }

    #[must_use]
    pub fn get(&self, normalized_query: &str) -> Option<ResolutionEntry> {
        let found = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(normalized_query)
            .cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store `entry` under `entry.query`. Re-putting an outcome equal to the
    /// current one (ignoring `resolved_at`) writes nothing.
    pub fn put(&self, entry: ResolutionEntry) -> Result<()> {
        let mut journal = self.lock_journal()?;
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if entries
                .get(&entry.query)
                .is_some_and(|current| current.same_outcome(&entry))
            {
                return Ok(());
            }
        }
        if let Some(journal) = journal.as_deref_mut() {
            let record = CacheRecord::Put(entry.clone());
            journal.append(&bincode::serde::encode_to_vec(&record, record_config())?)?;
        }
        tracing::debug!(query = %entry.query, status = ?entry.status, "resolution cached");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.query.clone(), entry);
        Ok(())
    }

    /// Remove a cached outcome so the next resolution goes back to the sources.
    /// Returns whether an entry was present.
    pub fn invalidate(&self, normalized_query: &str) -> Result<bool> {
        let mut journal = self.lock_journal()?;
        if !self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(normalized_query)
        {
            return Ok(false);
        }
        if let Some(journal) = journal.as_deref_mut() {
            let record = CacheRecord::Invalidate {
                query: normalized_query.to_string(),
            };
            journal.append(&bincode::serde::encode_to_vec(&record, record_config())?)?;
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(normalized_query);
        tracing::info!(query = %normalized_query, "resolution cache entry invalidated");
        Ok(true)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let (appends, log_bytes) = self.journal.as_ref().map_or((0, 0), |journal| {
            let journal = journal.lock().unwrap_or_else(PoisonError::into_inner);
            (journal.appends(), journal.len_bytes())
        });
        CacheStats {
            entries: self.len() as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            appends,
            corrupt_records: self.corrupt_records,
            log_bytes,
        }
    }

    /// Rewrite the log with one record per live entry, dropping superseded
    /// puts, tombstones and corrupt records.
    pub fn compact(&self) -> Result<()> {
        let mut guard = self.lock_journal()?;
        let Some(journal) = guard.as_deref_mut() else {
            return Ok(());
        };
        let payloads = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let mut sorted: Vec<_> = entries.values().collect();
            sorted.sort_by(|a, b| a.query.cmp(&b.query));
            sorted
                .into_iter()
                .map(|entry| {
                    bincode::serde::encode_to_vec(&CacheRecord::Put(entry.clone()), record_config())
                })
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        let before = journal.len_bytes();
        journal.rewrite(payloads.iter().map(Vec::as_slice))?;
        tracing::info!(
            entries = payloads.len(),
            before_bytes = before,
            after_bytes = journal.len_bytes(),
            "resolution cache compacted"
        );
        Ok(())
    }

    /// Force buffered appends to disk.
    pub fn flush(&self) -> Result<()> {
        if let Some(journal) = self.lock_journal()?.as_deref_mut() {
            journal.flush()?;
        }
        Ok(())
    }

    fn lock_journal(&self) -> Result<Option<std::sync::MutexGuard<'_, Journal>>> {
        self.journal
            .as_ref()
            .map(|journal| {
                journal
                    .lock()
                    .map_err(|_| ChemlinkError::Lock("resolution cache writer poisoned".into()))
            })
            .transpose()
    }
}
