//! Reference chemical records.

use serde::{Deserialize, Serialize};

/// One chemical entity from the reference dataset.
///
/// Records are immutable once built into an index; every synonym (and the
/// canonical name) becomes an index key pointing back at the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChemicalRecord {
    /// Stable database key, e.g. a PubChem CID.
    pub identifier: String,
    pub canonical_name: String,
    /// Sorted and deduplicated, exactly as they appear in the dataset.
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub formula: Option<String>,
}

impl ChemicalRecord {
    #[must_use]
    pub fn new(identifier: impl Into<String>, canonical_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            canonical_name: canonical_name.into(),
            synonyms: Vec::new(),
            formula: None,
        }
    }

    #[must_use]
    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms.extend(synonyms.into_iter().map(Into::into));
        self.synonyms.sort();
        self.synonyms.dedup();
        self
    }

    #[must_use]
    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// Canonical name followed by every synonym; the strings that become index keys.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}
