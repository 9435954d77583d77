//! Read-only reference index mapping normalized chemical names to records.
//!
//! The on-disk index is built once from a bulk dataset ([`IndexBuilder`]) and
//! then memory-mapped by every process that needs it. Lookups are a binary
//! search over a sorted key table and never fail: an absent or undecodable
//! entry is simply `None`.

mod builder;
mod dataset;

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use builder::{IndexBuildStats, IndexBuilder};
pub use dataset::{DatasetFormat, read_dataset};

use crate::error::Result;
use crate::io::index_file::IndexFile;
use crate::text::{name_similarity, normalize_name};
use crate::types::{ChemicalRecord, IndexOpenOptions};

/// A local name → record source consulted before any external lookup.
pub trait ChemicalLookup: Send + Sync {
    /// Exact lookup by an already-normalized name.
    fn lookup(&self, normalized: &str) -> Option<ChemicalRecord>;

    /// Records whose keys are at least `threshold` similar to `normalized`,
    /// best first, one per identifier.
    fn fuzzy_candidates(
        &self,
        _normalized: &str,
        _threshold: f64,
        _limit: usize,
    ) -> Vec<ChemicalRecord> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub records: u64,
    pub keys: u64,
    pub file_bytes: u64,
}

/// Memory-mapped reference index.
#[derive(Debug)]
pub struct ReferenceIndex {
    path: PathBuf,
    file: IndexFile,
    file_bytes: u64,
}

impl ReferenceIndex {
    /// Build an index file from `dataset` and open it.
    pub fn build(dataset: &Path, index_path: &Path) -> Result<Self> {
        IndexBuilder::new().build(dataset, index_path)?;
        Self::open(index_path)
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_options(path, IndexOpenOptions::default())
    }

    pub fn open_with_options(path: &Path, options: IndexOpenOptions) -> Result<Self> {
        let handle = File::open(path)?;
        let file_bytes = handle.metadata()?.len();
        let file = IndexFile::open(&handle, options.verify_checksum)?;
        tracing::info!(
            index = %path.display(),
            records = file.header().record_count,
            keys = file.header().key_count,
            "reference index opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            file_bytes,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Exact lookup of a normalized name.
    #[must_use]
    pub fn lookup(&self, normalized: &str) -> Option<ChemicalRecord> {
        let slot = self.file.find(normalized.as_bytes())?;
        self.file.record_at(slot)
    }

    /// Number of keys (names and synonyms) in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.file.key_count()
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let header = self.file.header();
        IndexStats {
            records: header.record_count,
            keys: header.key_count,
            file_bytes: self.file_bytes,
        }
    }

    /// Keys in sorted order.
    pub fn iter_keys(&self) -> impl Iterator<Item = &str> + '_ {
        (0..self.file.key_count())
            .filter_map(|idx| self.file.key_at(idx))
            .filter_map(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Linear scan for keys similar to `normalized`.
    ///
    /// Keys whose length alone rules out reaching `threshold` are skipped
    /// before computing the edit distance.
    #[must_use]
    pub fn fuzzy_candidates(
        &self,
        normalized: &str,
        threshold: f64,
        limit: usize,
    ) -> Vec<ChemicalRecord> {
        let query = normalize_name(normalized);
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }
        let query_len = query.chars().count();
        let mut scored = Vec::new();
        for idx in 0..self.file.key_count() {
            let Some(key) = self.file.key_at(idx).and_then(|b| std::str::from_utf8(b).ok()) else {
                continue;
            };
            if !length_can_match(query_len, key.chars().count(), threshold) {
                continue;
            }
            let score = name_similarity(&query, key);
            if score >= threshold {
                scored.push((score, idx));
            }
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let records = scored
            .into_iter()
            .filter_map(|(score, idx)| self.file.record_at(idx).map(|record| (score, record)));
        best_per_identifier(records, limit)
    }
}

impl ChemicalLookup for ReferenceIndex {
    fn lookup(&self, normalized: &str) -> Option<ChemicalRecord> {
        ReferenceIndex::lookup(self, normalized)
    }

    fn fuzzy_candidates(&self, normalized: &str, threshold: f64, limit: usize) -> Vec<ChemicalRecord> {
        ReferenceIndex::fuzzy_candidates(self, normalized, threshold, limit)
    }
}

/// In-process lookup table with the same semantics as [`ReferenceIndex`].
///
/// Suited to curated synonym maps and fixtures; keys are normalized on insert.
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    keys: BTreeMap<String, usize>,
    records: Vec<ChemicalRecord>,
}

impl MemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `record` under its canonical name and every synonym. Later
    /// inserts win on key collision.
    pub fn insert(&mut self, record: ChemicalRecord) {
        let pos = self.records.len();
        for name in record.names() {
            let key = normalize_name(name);
            if !key.is_empty() {
                self.keys.insert(key, pos);
            }
        }
        self.records.push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<ChemicalRecord> for MemoryIndex {
    fn from_iter<T: IntoIterator<Item = ChemicalRecord>>(iter: T) -> Self {
        let mut index = Self::new();
        for record in iter {
            index.insert(record);
        }
        index
    }
}

impl ChemicalLookup for MemoryIndex {
    fn lookup(&self, normalized: &str) -> Option<ChemicalRecord> {
        self.keys
            .get(normalized)
            .and_then(|pos| self.records.get(*pos))
            .cloned()
    }

    fn fuzzy_candidates(&self, normalized: &str, threshold: f64, limit: usize) -> Vec<ChemicalRecord> {
        let query = normalize_name(normalized);
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(f64, &ChemicalRecord)> = self
            .keys
            .iter()
            .filter_map(|(key, pos)| {
                let score = name_similarity(&query, key);
                (score >= threshold)
                    .then(|| self.records.get(*pos).map(|record| (score, record)))
                    .flatten()
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        best_per_identifier(scored.into_iter().map(|(s, r)| (s, r.clone())), limit)
    }
}

/// Upper bound of normalized Levenshtein similarity given two lengths.
fn length_can_match(a: usize, b: usize, threshold: f64) -> bool {
    let longest = a.max(b);
    if longest == 0 {
        return true;
    }
    let best = 1.0 - (a.abs_diff(b) as f64 / longest as f64);
    best >= threshold
}

fn best_per_identifier(
    sorted: impl Iterator<Item = (f64, ChemicalRecord)>,
    limit: usize,
) -> Vec<ChemicalRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (_, record) in sorted {
        if seen.insert(record.identifier.clone()) {
            out.push(record);
            if out.len() >= limit {
                break;
            }
        }
    }
    out
}
