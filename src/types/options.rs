//! Tunable options for the index, cache, resolver, external client and cleaner.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FUZZY_THRESHOLD, DEFAULT_PUBCHEM_BACKOFF_MS, DEFAULT_PUBCHEM_BASE_URL,
    DEFAULT_PUBCHEM_MAX_RETRIES, DEFAULT_PUBCHEM_TIMEOUT_MS, DEFAULT_RESOLVER_WORKERS,
};

/// Controls how a prebuilt reference index is opened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOpenOptions {
    /// Hash the whole body and compare against the header checksum.
    /// Costs one sequential read of the file.
    pub verify_checksum: bool,
}

impl Default for IndexOpenOptions {
    fn default() -> Self {
        Self {
            verify_checksum: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Skip the per-record fsync; callers must `flush()` themselves.
    pub skip_sync: bool,
}

/// Search modes offered by the external chemical database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Exact match against any registered name or synonym.
    Name,
    /// Word-level synonym match; broader and noisier than `Name`.
    Word,
    /// Molecular-formula match (`Al2O3`, `ZnO`).
    Formula,
}

impl SearchMode {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Word => "word",
            Self::Formula => "formula",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverOptions {
    /// Minimum similarity for fuzzy matches against curated synonyms and the index.
    pub fuzzy_threshold: f64,
    /// Scan the reference index for approximate matches on an exact miss.
    /// Linear in index size; off by default.
    pub local_fuzzy: bool,
    /// Upper bound on candidates kept from a local fuzzy scan.
    pub local_fuzzy_limit: usize,
    /// Worker threads used by `resolve_many`.
    pub workers: usize,
    /// External search modes, queried in order and merged.
    pub search_modes: Vec<SearchMode>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            local_fuzzy: false,
            local_fuzzy_limit: 16,
            workers: DEFAULT_RESOLVER_WORKERS,
            search_modes: vec![SearchMode::Name, SearchMode::Formula],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PubChemOptions {
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Initial backoff, doubled after each retry.
    pub backoff_ms: u64,
}

impl Default for PubChemOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PUBCHEM_BASE_URL.to_string(),
            timeout_ms: DEFAULT_PUBCHEM_TIMEOUT_MS,
            max_retries: DEFAULT_PUBCHEM_MAX_RETRIES,
            backoff_ms: DEFAULT_PUBCHEM_BACKOFF_MS,
        }
    }
}

/// Options for pruning empty extraction output before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanOptions {
    pub enabled: bool,
    /// Keys whose values are kept verbatim even when null or empty.
    pub skip_keys: Vec<String>,
    /// Drop QUDT quantity objects that carry units but no numeric value.
    pub prune_empty_quantities: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_keys: Vec::new(),
            prune_empty_quantities: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerOptions {
    /// Validate each element of this top-level array separately
    /// (for example `"processes"`), prefixing error paths with its index.
    pub instances_key: Option<String>,
}
