//! File-based configuration for assembling a [`Normalizer`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::ResolutionCache;
use crate::error::{ChemlinkError, Result};
use crate::index::ReferenceIndex;
use crate::pipeline::{ALD_INCLUDE_PATHS, NormalizationPlan, Normalizer};
use crate::reconcile::SchemaReconciler;
use crate::resolver::Resolver;
use crate::types::{
    CacheOptions, ChemicalRecord, CleanOptions, IndexOpenOptions, PubChemOptions, ReconcilerOptions,
    ResolverOptions,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Prebuilt reference index; without it only curated synonyms and the
    /// external source are consulted.
    pub index_path: Option<PathBuf>,
    pub index: IndexOpenOptions,
    /// Resolution cache log; in-memory when unset.
    pub cache_path: Option<PathBuf>,
    pub cache: CacheOptions,
    /// Hand-curated `synonym → identifier` pairs, checked before the index.
    /// A hit reports the synonym itself as the canonical name.
    pub curated_synonyms: BTreeMap<String, String>,
    /// Curated entries with their own canonical name and synonyms.
    pub curated_records: Vec<ChemicalRecord>,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
    pub instances_key: Option<String>,
    /// Query PubChem when local sources miss.
    pub external_lookup: bool,
    pub resolver: ResolverOptions,
    pub pubchem: PubChemOptions,
    pub clean: CleanOptions,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            index: IndexOpenOptions::default(),
            cache_path: None,
            cache: CacheOptions::default(),
            curated_synonyms: BTreeMap::new(),
            curated_records: Vec::new(),
            include_paths: ALD_INCLUDE_PATHS.iter().map(ToString::to_string).collect(),
            exclude_paths: Vec::new(),
            instances_key: Some("processes".to_string()),
            external_lookup: true,
            resolver: ResolverOptions::default(),
            pubchem: PubChemOptions::default(),
            clean: CleanOptions::default(),
        }
    }
}

impl NormalizationConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs_err::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|err| {
            ChemlinkError::Config(format!("{}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot produce a working pipeline.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.resolver.fuzzy_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ChemlinkError::Config(format!(
                "resolver.fuzzy_threshold must be within [0, 1], got {threshold}"
            )));
        }
        if self.resolver.workers == 0 {
            return Err(ChemlinkError::Config("resolver.workers must be at least 1".into()));
        }
        if self.include_paths.is_empty() {
            return Err(ChemlinkError::Config("include_paths is empty".into()));
        }
        if self.external_lookup && self.resolver.search_modes.is_empty() {
            return Err(ChemlinkError::Config(
                "external_lookup is enabled but resolver.search_modes is empty".into(),
            ));
        }
        Ok(())
    }

    pub fn plan(&self) -> Result<NormalizationPlan> {
        NormalizationPlan::new(
            &self.include_paths,
            &self.exclude_paths,
            self.instances_key.clone(),
        )
    }

    /// Open the index and cache and wire up the resolver.
    pub fn build_resolver(&self) -> Result<Resolver> {
        self.validate()?;
        let mut builder = Resolver::builder()
            .options(self.resolver.clone())
            .curated_synonyms(self.curated_synonyms.clone())
            .curated_records(self.curated_records.iter().cloned());

        if let Some(path) = &self.index_path {
            builder = builder.index(Arc::new(ReferenceIndex::open_with_options(path, self.index)?));
        }
        let cache = match &self.cache_path {
            Some(path) => ResolutionCache::open_with_options(path, self.cache)?,
            None => ResolutionCache::in_memory(),
        };
        builder = builder.cache(Arc::new(cache));

        if self.external_lookup {
            builder = self.attach_external(builder)?;
        }
        Ok(builder.build())
    }

    #[cfg(feature = "pubchem")]
    fn attach_external(&self, builder: crate::resolver::ResolverBuilder) -> Result<crate::resolver::ResolverBuilder> {
        let client = crate::pubchem::PubChemClient::new(&self.pubchem)?;
        Ok(builder.source(Arc::new(client)))
    }

    #[cfg(not(feature = "pubchem"))]
    fn attach_external(&self, builder: crate::resolver::ResolverBuilder) -> Result<crate::resolver::ResolverBuilder> {
        tracing::warn!("external_lookup requested but the `pubchem` feature is disabled");
        Ok(builder)
    }

    /// Full pipeline validating against `schema`.
    pub fn build_normalizer(&self, schema: &Value) -> Result<Normalizer> {
        let reconciler = SchemaReconciler::with_options(
            schema,
            ReconcilerOptions {
                instances_key: self.instances_key.clone(),
            },
        )?;
        let resolver = Arc::new(self.build_resolver()?);
        Ok(Normalizer::new(resolver, reconciler, self.plan()?).with_clean_options(self.clean.clone()))
    }
}
