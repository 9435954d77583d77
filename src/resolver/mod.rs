//! Raw chemical name → canonical identifier resolution.
//!
//! Lookup order for a normalized key: resolution cache, exact curated
//! synonym, exact reference-index key, curated fuzzy match, reference-index
//! fuzzy match (when enabled), then every configured external search mode. Whatever the outcome, it is cached
//! before being returned, so a key reaches the external source at most once.

mod candidates;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use once_cell::sync::OnceCell;

use crate::cache::ResolutionCache;
use crate::index::{ChemicalLookup, MemoryIndex};
use crate::pubchem::CompoundSource;
use crate::text::normalize_name;
use crate::types::{
    ChemicalRecord, ResolutionEntry, ResolutionSource, ResolutionStatus, ResolverOptions,
};

use candidates::{decide, merge_candidates};

type InFlight = Mutex<HashMap<String, Arc<OnceCell<ResolutionEntry>>>>;

/// Thread-safe name resolver. Share it behind an `Arc`.
pub struct Resolver {
    curated: MemoryIndex,
    index: Option<Arc<dyn ChemicalLookup>>,
    cache: Arc<ResolutionCache>,
    source: Option<Arc<dyn CompoundSource>>,
    options: ResolverOptions,
    in_flight: InFlight,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("curated", &self.curated.len())
            .field("index", &self.index.is_some())
            .field("source", &self.source.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct ResolverBuilder {
    curated: MemoryIndex,
    index: Option<Arc<dyn ChemicalLookup>>,
    cache: Option<Arc<ResolutionCache>>,
    source: Option<Arc<dyn CompoundSource>>,
    options: ResolverOptions,
}

impl ResolverBuilder {
    #[must_use]
    pub fn index(mut self, index: Arc<dyn ChemicalLookup>) -> Self {
        self.index = Some(index);
        self
    }

    /// Map one hand-curated synonym to an identifier. The synonym doubles as
    /// the canonical name; use [`ResolverBuilder::curated_record`] to supply a
    /// separate one.
    #[must_use]
    pub fn curated_synonym(mut self, name: impl Into<String>, identifier: impl Into<String>) -> Self {
        self.curated.insert(ChemicalRecord::new(identifier, name));
        self
    }

    #[must_use]
    pub fn curated_synonyms<I, N, S>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, S)>,
        N: Into<String>,
        S: Into<String>,
    {
        for (name, identifier) in pairs {
            self.curated.insert(ChemicalRecord::new(identifier, name));
        }
        self
    }

    #[must_use]
    pub fn curated_record(mut self, record: ChemicalRecord) -> Self {
        self.curated.insert(record);
        self
    }

    #[must_use]
    pub fn curated_records(mut self, records: impl IntoIterator<Item = ChemicalRecord>) -> Self {
        for record in records {
            self.curated.insert(record);
        }
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn source(mut self, source: Arc<dyn CompoundSource>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    /// Without an explicit cache the resolver keeps outcomes in memory only.
    #[must_use]
    pub fn build(self) -> Resolver {
        Resolver {
            curated: self.curated,
            index: self.index,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(ResolutionCache::in_memory())),
            source: self.source,
            options: self.options,
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

impl Resolver {
    #[must_use]
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::default()
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<ResolutionCache> {
        &self.cache
    }

    #[must_use]
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve one raw name. Never fails: lookup problems surface as an
    /// unresolved entry with [`ResolutionSource::ExternalFailure`].
    pub fn resolve(&self, raw_name: &str) -> ResolutionEntry {
        let key = normalize_name(raw_name);
        if key.is_empty() {
            return ResolutionEntry::unresolved(key, ResolutionSource::Empty);
        }
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(query = %key, "resolution cache hit");
            return hit;
        }

        let slot = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };
        let entry = slot
            .get_or_init(|| {
                // Another leader may have finished between our miss and taking the slot.
                if let Some(hit) = self.cache.get(&key) {
                    return hit;
                }
                let entry = self.resolve_uncached(raw_name, &key);
                if let Err(err) = self.cache.put(entry.clone()) {
                    tracing::warn!(query = %key, error = %err, "failed to persist resolution");
                }
                entry
            })
            .clone();

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            in_flight.remove(&key);
        }
        entry
    }

    /// Resolve many names on a bounded worker pool; output order matches input.
    #[tracing::instrument(skip_all, fields(names = raw_names.len(), workers = self.options.workers))]
    pub fn resolve_many<S>(&self, raw_names: &[S]) -> Vec<ResolutionEntry>
    where
        S: AsRef<str> + Sync,
    {
        let workers = self.options.workers.max(1).min(raw_names.len());
        if workers <= 1 {
            return raw_names.iter().map(|raw| self.resolve(raw.as_ref())).collect();
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, &str)>();
        for (pos, raw) in raw_names.iter().enumerate() {
            if job_tx.send((pos, raw.as_ref())).is_err() {
                break;
            }
        }
        drop(job_tx);

        let (done_tx, done_rx) = crossbeam_channel::unbounded::<(usize, ResolutionEntry)>();
        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                scope.spawn(move || {
                    for (pos, raw) in job_rx.iter() {
                        if done_tx.send((pos, self.resolve(raw))).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(done_tx);

        let mut results: Vec<Option<ResolutionEntry>> = vec![None; raw_names.len()];
        for (pos, entry) in done_rx.try_iter() {
            results[pos] = Some(entry);
        }
        results
            .into_iter()
            .zip(raw_names)
            .map(|(entry, raw)| entry.unwrap_or_else(|| self.resolve(raw.as_ref())))
            .collect()
    }

    fn resolve_uncached(&self, raw_name: &str, key: &str) -> ResolutionEntry {
        if let Some(record) = self.curated.lookup(key) {
            tracing::debug!(query = %key, identifier = %record.identifier, "curated synonym hit");
            return ResolutionEntry::resolved(key, &record, ResolutionSource::Curated);
        }
        if let Some(record) = self.index.as_ref().and_then(|index| index.lookup(key)) {
            tracing::debug!(query = %key, identifier = %record.identifier, "reference index hit");
            return ResolutionEntry::resolved(key, &record, ResolutionSource::ReferenceIndex);
        }

        // Fuzzy passes only settle a query with a unique winner; an ambiguous
        // local outcome is kept in case later layers find nothing better.
        let mut ambiguous: Option<ResolutionEntry> = None;
        if !self.curated.is_empty() {
            let fuzzy = self
                .curated
                .fuzzy_candidates(key, self.options.fuzzy_threshold, usize::MAX);
            if !fuzzy.is_empty() {
                tracing::debug!(query = %key, candidates = fuzzy.len(), "curated fuzzy match");
                let entry = decide(key, &fuzzy, ResolutionSource::Curated);
                if entry.status == ResolutionStatus::Resolved {
                    return entry;
                }
                ambiguous.get_or_insert(entry);
            }
        }
        if let Some(index) = self.index.as_ref().filter(|_| self.options.local_fuzzy) {
            let fuzzy = index.fuzzy_candidates(
                key,
                self.options.fuzzy_threshold,
                self.options.local_fuzzy_limit,
            );
            if !fuzzy.is_empty() {
                tracing::debug!(query = %key, candidates = fuzzy.len(), "reference index fuzzy match");
                let entry = decide(key, &fuzzy, ResolutionSource::ReferenceIndex);
                if entry.status == ResolutionStatus::Resolved {
                    return entry;
                }
                ambiguous.get_or_insert(entry);
            }
        }

        let external = self.resolve_external(raw_name, key);
        match (external.status, ambiguous) {
            (ResolutionStatus::Unresolved, Some(local)) => local,
            _ => external,
        }
    }

    fn resolve_external(&self, raw_name: &str, key: &str) -> ResolutionEntry {
        let Some(source) = &self.source else {
            tracing::debug!(query = %key, "no local match and no external source configured");
            return ResolutionEntry::unresolved(key, ResolutionSource::ReferenceIndex);
        };

        // External searches see the caller's text (case matters for formulas).
        let external_query = raw_name.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut batches = Vec::with_capacity(self.options.search_modes.len());
        for mode in &self.options.search_modes {
            match source.search(&external_query, *mode) {
                Ok(found) => batches.push(found),
                Err(err) => {
                    tracing::warn!(
                        query = %key,
                        mode = mode.label(),
                        error = %err,
                        "external lookup failed; leaving name unresolved"
                    );
                    return ResolutionEntry::unresolved(key, ResolutionSource::ExternalFailure);
                }
            }
        }

        let merged = merge_candidates(batches);
        let entry = decide(key, &merged, ResolutionSource::ExternalApi);
        tracing::debug!(
            query = %key,
            candidates = merged.len(),
            status = ?entry.status,
            "external lookup finished"
        );
        entry
    }
}
