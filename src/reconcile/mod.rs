//! Merging resolutions into a document and validating it against a JSON Schema.

mod cleaner;

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

pub use cleaner::clean_document;

use crate::constants::{
    FIELD_CANONICAL_IDENTIFIER, FIELD_CANONICAL_NAME, FIELD_NEEDS_REVIEW, FIELD_RAW_TEXT,
};
use crate::document::{ExtractionDocument, FieldPath};
use crate::error::{ChemlinkError, Result};
use crate::types::{FieldError, ReconcilerOptions, ResolutionEntry, ReviewItem, ValidationReport};

pub struct SchemaReconciler {
    validator: jsonschema::Validator,
    options: ReconcilerOptions,
}

impl std::fmt::Debug for SchemaReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaReconciler")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SchemaReconciler {
    /// Compile `schema`. The draft is taken from `$schema` when present.
    pub fn new(schema: &Value) -> Result<Self> {
        Self::with_options(schema, ReconcilerOptions::default())
    }

    pub fn with_options(schema: &Value, options: ReconcilerOptions) -> Result<Self> {
        let validator =
            jsonschema::validator_for(schema).map_err(|err| ChemlinkError::Schema(err.to_string()))?;
        Ok(Self { validator, options })
    }

    /// Load and compile a schema file.
    pub fn from_file(path: &std::path::Path, options: ReconcilerOptions) -> Result<Self> {
        let raw = fs_err::read_to_string(path)?;
        let schema: Value = serde_json::from_str(&raw)?;
        Self::with_options(&schema, options)
    }

    #[must_use]
    pub fn options(&self) -> &ReconcilerOptions {
        &self.options
    }

    /// Attach resolutions to their fields, then validate the result.
    ///
    /// Resolved fields become `{raw_text, canonical_identifier,
    /// canonical_name}`; every other status keeps the raw text, gains
    /// `needs_review: true` and is listed in the report's review items. A path
    /// that is missing or does not hold a name is reported as an error and
    /// skipped. The document is always returned.
    #[tracing::instrument(skip_all, fields(fields = resolved_fields.len()))]
    pub fn reconcile(
        &self,
        mut document: ExtractionDocument,
        resolved_fields: &BTreeMap<FieldPath, ResolutionEntry>,
    ) -> (ExtractionDocument, ValidationReport) {
        let mut merge_errors = Vec::new();
        let mut review = Vec::new();

        for (path, entry) in resolved_fields {
            let shown = path.to_string();
            let raw_text = match field_raw_text(&document, path) {
                Ok(raw) => raw,
                Err(message) => {
                    tracing::warn!(path = %shown, reason = %message, "skipping unmergeable field");
                    merge_errors.push(FieldError {
                        path: shown,
                        message,
                    });
                    continue;
                }
            };

            let replacement = if entry.is_resolved() {
                json!({
                    FIELD_RAW_TEXT: raw_text,
                    FIELD_CANONICAL_IDENTIFIER: entry.identifier,
                    FIELD_CANONICAL_NAME: entry.canonical_name,
                })
            } else {
                review.push(ReviewItem {
                    path: shown.clone(),
                    raw_text: raw_text.clone(),
                    status: entry.status,
                    candidates: entry.candidates.clone(),
                });
                json!({
                    FIELD_RAW_TEXT: raw_text,
                    FIELD_NEEDS_REVIEW: true,
                })
            };

            if let Err(err) = document.set(path, replacement) {
                merge_errors.push(FieldError {
                    path: shown,
                    message: err.to_string(),
                });
            }
        }

        let mut report = self.validate(&document);
        if !merge_errors.is_empty() {
            merge_errors.append(&mut report.errors);
            report.errors = merge_errors;
            report.is_valid = false;
        }
        report.review = review;
        tracing::debug!(
            errors = report.errors.len(),
            review = report.review.len(),
            valid = report.is_valid,
            "document reconciled"
        );
        (document, report)
    }

    /// Collect every schema violation without touching the document.
    #[must_use]
    pub fn validate(&self, document: &ExtractionDocument) -> ValidationReport {
        let root = document.as_value();
        let mut errors = Vec::new();
        match self
            .options
            .instances_key
            .as_deref()
            .and_then(|key| root.get(key).map(|value| (key, value)))
        {
            Some((key, Value::Array(instances))) => {
                for (idx, instance) in instances.iter().enumerate() {
                    let prefix = FieldPath::root().key(key).index(idx);
                    self.collect_errors(instance, &prefix, &mut errors);
                }
            }
            Some((key, instance)) => {
                self.collect_errors(instance, &FieldPath::root().key(key), &mut errors);
            }
            None => self.collect_errors(root, &FieldPath::root(), &mut errors),
        }
        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
            review: Vec::new(),
        }
    }

    fn collect_errors(&self, instance: &Value, prefix: &FieldPath, out: &mut Vec<FieldError>) {
        for err in self.validator.iter_errors(instance) {
            let pointer = err.instance_path.to_string();
            let path = prefix.join(&FieldPath::from_json_pointer(&pointer, instance));
            out.push(FieldError {
                path: path.to_string(),
                message: err.to_string(),
            });
        }
    }
}

/// The source string of a chemical field, or why the field cannot be merged.
fn field_raw_text(document: &ExtractionDocument, path: &FieldPath) -> std::result::Result<String, String> {
    if !path.is_concrete() {
        return Err("path contains a wildcard".to_string());
    }
    match document.get(path) {
        None => Err("field not found".to_string()),
        Some(Value::String(raw)) => Ok(raw.clone()),
        // Already reconciled on an earlier pass.
        Some(Value::Object(map)) if raw_text_of(map).is_some() => {
            Ok(raw_text_of(map).unwrap_or_default().to_string())
        }
        Some(other) => Err(format!("expected a chemical name, found {}", json_type(other))),
    }
}

fn raw_text_of(map: &Map<String, Value>) -> Option<&str> {
    map.get(FIELD_RAW_TEXT).and_then(Value::as_str)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChemicalRecord, ResolutionSource, ResolutionStatus};

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "material": {"$ref": "#/definitions/chemical"},
                "precursor": {"$ref": "#/definitions/chemical"},
                "coReactant": {"$ref": "#/definitions/chemical"},
                "temperature": {"type": "number"}
            },
            "definitions": {
                "chemical": {
                    "type": "object",
                    "required": ["raw_text", "canonical_identifier"]
                }
            }
        })
    }

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).expect("path")
    }

    fn resolutions() -> BTreeMap<FieldPath, ResolutionEntry> {
        let mut fields = BTreeMap::new();
        fields.insert(
            path("material"),
            ResolutionEntry::resolved(
                "zinc oxide",
                &ChemicalRecord::new("ZNO-001", "zinc oxide"),
                ResolutionSource::ReferenceIndex,
            ),
        );
        fields.insert(
            path("precursor"),
            ResolutionEntry::ambiguous(
                "tma",
                vec!["A".into(), "B".into()],
                ResolutionSource::ExternalApi,
            ),
        );
        fields.insert(
            path("coReactant"),
            ResolutionEntry::unresolved("mystery", ResolutionSource::ExternalApi),
        );
        fields
    }

    #[test]
    fn resolved_fields_are_structured_and_others_flagged() {
        let reconciler = SchemaReconciler::new(&schema()).expect("schema");
        let document = ExtractionDocument::new(json!({
            "material": "Zinc Oxide",
            "precursor": "TMA",
            "coReactant": "mystery gas",
            "temperature": 150
        }));
        let (merged, report) = reconciler.reconcile(document, &resolutions());

        assert_eq!(
            merged.as_value()["material"],
            json!({"raw_text": "Zinc Oxide", "canonical_identifier": "ZNO-001", "canonical_name": "zinc oxide"})
        );
        assert_eq!(
            merged.as_value()["precursor"],
            json!({"raw_text": "TMA", "needs_review": true})
        );
        assert_eq!(
            merged.as_value()["coReactant"],
            json!({"raw_text": "mystery gas", "needs_review": true})
        );

        assert!(!report.is_valid);
        let mut paths = report.error_paths();
        paths.sort_unstable();
        assert_eq!(paths, vec!["coReactant", "precursor"]);
        assert_eq!(report.review.len(), 2);
        let ambiguous = report
            .review
            .iter()
            .find(|item| item.path == "precursor")
            .expect("precursor review item");
        assert_eq!(ambiguous.status, ResolutionStatus::Ambiguous);
        assert_eq!(ambiguous.candidates, vec!["A", "B"]);
    }

    #[test]
    fn missing_and_non_string_fields_are_reported_not_fatal() {
        let reconciler = SchemaReconciler::new(&json!({"type": "object"})).expect("schema");
        let document = ExtractionDocument::new(json!({"material": "ZnO", "precursor": 42}));
        let (merged, report) = reconciler.reconcile(document, &resolutions());
        assert_eq!(merged.as_value()["material"]["canonical_identifier"], json!("ZNO-001"));
        assert_eq!(merged.as_value()["precursor"], json!(42));
        let paths = report.error_paths();
        assert!(paths.contains(&"coReactant"), "{paths:?}");
        assert!(paths.contains(&"precursor"), "{paths:?}");
        assert!(!report.is_valid);
    }

    #[test]
    fn reconciling_twice_keeps_raw_text() {
        let reconciler = SchemaReconciler::new(&json!({})).expect("schema");
        let mut fields = BTreeMap::new();
        fields.insert(path("material"), resolutions().remove(&path("material")).expect("entry"));
        let (once, _) = reconciler.reconcile(
            ExtractionDocument::new(json!({"material": "Zinc Oxide"})),
            &fields,
        );
        let (twice, report) = reconciler.reconcile(once.clone(), &fields);
        assert_eq!(once, twice);
        assert!(report.is_valid);
    }

    #[test]
    fn validation_collects_every_violation_with_dot_paths() {
        let schema = json!({
            "type": "object",
            "required": ["aldSystem"],
            "properties": {
                "aldSystem": {
                    "type": "object",
                    "properties": {
                        "cycles": {"type": "integer"},
                        "mode": {"enum": ["thermal", "plasma"]}
                    }
                }
            }
        });
        let reconciler = SchemaReconciler::with_options(
            &schema,
            ReconcilerOptions {
                instances_key: Some("processes".into()),
            },
        )
        .expect("schema");
        let document = ExtractionDocument::new(json!({
            "processes": [
                {"aldSystem": {"cycles": "many", "mode": "spatial"}},
                {"aldSystem": {"cycles": 200}},
                {}
            ]
        }));
        let before = document.clone();
        let report = reconciler.validate(&document);
        assert_eq!(document, before);
        let mut paths = report.error_paths();
        paths.sort_unstable();
        assert_eq!(
            paths,
            vec![
                "processes[0].aldSystem.cycles",
                "processes[0].aldSystem.mode",
                "processes[2]"
            ]
        );
    }

    #[test]
    fn error_paths_keep_numeric_and_dotted_keys() {
        let numeric_map = json!({
            "type": "object",
            "additionalProperties": {
                "type": "object",
                "additionalProperties": {"type": "number"}
            }
        });
        let schema = json!({
            "type": "object",
            "properties": {"layers": numeric_map, "film.stack": numeric_map}
        });
        let reconciler = SchemaReconciler::new(&schema).expect("schema");
        let document = ExtractionDocument::new(json!({
            "layers": {"0": {"thickness": "thin"}},
            "film.stack": {"1": {"ratio": 2}, "2": {"a.b": "x"}}
        }));
        let report = reconciler.validate(&document);
        let mut paths = report.error_paths();
        paths.sort_unstable();
        assert_eq!(paths, vec![r#"["film.stack"].2["a.b"]"#, "layers.0.thickness"]);
        for shown in paths {
            let parsed = FieldPath::parse(shown).expect("error path parses back");
            assert!(document.get(&parsed).is_some(), "{shown} addresses the offending value");
        }
    }

    #[test]
    fn invalid_schema_is_rejected() {
        let err = SchemaReconciler::new(&json!({"type": 12})).expect_err("bad schema");
        assert!(matches!(err, ChemlinkError::Schema(_)), "got {err:?}");
    }
}
