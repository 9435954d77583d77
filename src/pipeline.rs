//! End-to-end normalization of one extraction document.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{ExtractionDocument, FieldPath};
use crate::error::{ChemlinkError, Result};
use crate::reconcile::{SchemaReconciler, clean_document};
use crate::resolver::Resolver;
use crate::types::{CleanOptions, ResolutionEntry, ValidationReport};

/// Chemical fields of an Atomic Layer Deposition process record.
pub const ALD_INCLUDE_PATHS: &[&str] = &[
    "aldSystem.aldMethod[*].compound",
    "aldSystem.materialDeposited",
    "reactantSelection.precursor[*].compound",
    "reactantSelection.precursor[*].precursor",
    "reactantSelection.coReactant[*].compound",
    "reactantSelection.coReactant[*].coReactant",
    "reactantSelection.carrierGas",
    "reactantSelection.purgingGas",
    "processParameters.substrate",
];

/// Which fields of a document hold chemical names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationPlan {
    /// Patterns, relative to each instance when `instances_key` is set.
    pub include_paths: Vec<FieldPath>,
    pub exclude_paths: Vec<FieldPath>,
    /// Top-level array whose elements are normalized independently.
    pub instances_key: Option<String>,
}

impl NormalizationPlan {
    /// Parse include and exclude patterns.
    pub fn new<I, E, S, T>(include: I, exclude: E, instances_key: Option<String>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Ok(Self {
            include_paths: include
                .into_iter()
                .map(|raw| FieldPath::parse(raw.as_ref()))
                .collect::<Result<_>>()?,
            exclude_paths: exclude
                .into_iter()
                .map(|raw| FieldPath::parse(raw.as_ref()))
                .collect::<Result<_>>()?,
            instances_key,
        })
    }

    /// The ALD field set, one process per element of `processes`.
    #[must_use]
    pub fn ald() -> Self {
        Self {
            include_paths: ALD_INCLUDE_PATHS
                .iter()
                .filter_map(|raw| FieldPath::parse(raw).ok())
                .collect(),
            exclude_paths: Vec::new(),
            instances_key: Some("processes".to_string()),
        }
    }
}

impl Default for NormalizationPlan {
    fn default() -> Self {
        Self::ald()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub document: ExtractionDocument,
    pub report: ValidationReport,
    /// Resolution attached to each collected field.
    pub resolutions: BTreeMap<FieldPath, ResolutionEntry>,
    /// Values dropped by the cleaner before collection.
    pub removed_values: usize,
}

/// Clean → collect → resolve → reconcile, with every collaborator passed in.
#[derive(Debug)]
pub struct Normalizer {
    resolver: Arc<Resolver>,
    reconciler: SchemaReconciler,
    plan: NormalizationPlan,
    clean: CleanOptions,
}

impl Normalizer {
    #[must_use]
    pub fn new(resolver: Arc<Resolver>, reconciler: SchemaReconciler, plan: NormalizationPlan) -> Self {
        Self {
            resolver,
            reconciler,
            plan,
            clean: CleanOptions::default(),
        }
    }

    #[must_use]
    pub fn with_clean_options(mut self, clean: CleanOptions) -> Self {
        self.clean = clean;
        self
    }

    #[must_use]
    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    #[must_use]
    pub fn plan(&self) -> &NormalizationPlan {
        &self.plan
    }

    /// Concrete paths and raw names of every chemical field in `document`.
    #[must_use]
    pub fn collect_fields(&self, document: &ExtractionDocument) -> Vec<(FieldPath, String)> {
        let prefixes = match self
            .plan
            .instances_key
            .as_deref()
            .and_then(|key| document.as_value().get(key).map(|value| (key, value)))
        {
            Some((key, Value::Array(instances))) => (0..instances.len())
                .map(|idx| FieldPath::root().key(key).index(idx))
                .collect(),
            Some((key, _)) => vec![FieldPath::root().key(key)],
            None => vec![FieldPath::root()],
        };

        let mut fields = Vec::new();
        for prefix in &prefixes {
            let excluded: Vec<FieldPath> = self
                .plan
                .exclude_paths
                .iter()
                .map(|pattern| prefix.join(pattern))
                .collect();
            for pattern in &self.plan.include_paths {
                for (path, value) in document.expand(&prefix.join(pattern)) {
                    let Some(raw) = value.as_str() else { continue };
                    if raw.trim().is_empty()
                        || excluded.iter().any(|ex| path.falls_under(ex))
                    {
                        continue;
                    }
                    fields.push((path, raw.to_string()));
                }
            }
        }
        fields
    }

    #[tracing::instrument(skip_all)]
    pub fn normalize(&self, document: ExtractionDocument) -> Result<NormalizedDocument> {
        let mut value = document.into_value();
        if !value.is_object() {
            return Err(ChemlinkError::InvalidPath {
                path: String::new(),
                reason: "document root must be an object".into(),
            });
        }
        let removed_values = clean_document(&mut value, &self.clean);
        let document = ExtractionDocument::new(value);

        let fields = self.collect_fields(&document);
        let mut unique: Vec<&str> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (_, raw) in &fields {
            positions.entry(raw.as_str()).or_insert_with(|| {
                unique.push(raw.as_str());
                unique.len() - 1
            });
        }
        let entries = self.resolver.resolve_many(&unique);

        let resolutions: BTreeMap<FieldPath, ResolutionEntry> = fields
            .iter()
            .filter_map(|(path, raw)| {
                let pos = *positions.get(raw.as_str())?;
                entries.get(pos).map(|entry| (path.clone(), entry.clone()))
            })
            .collect();

        tracing::info!(
            fields = fields.len(),
            distinct_names = unique.len(),
            removed_values,
            "resolved chemical fields"
        );
        let (document, report) = self.reconciler.reconcile(document, &resolutions);
        Ok(NormalizedDocument {
            document,
            report,
            resolutions,
            removed_values,
        })
    }
}
