//! Outcome of resolving one chemical name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::ChemicalRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Resolved,
    Unresolved,
    Ambiguous,
}

impl ResolutionStatus {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Resolved => "RESOLVED",
            Self::Unresolved => "UNRESOLVED",
            Self::Ambiguous => "AMBIGUOUS",
        }
    }
}

/// Which layer produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Manually curated synonym map supplied in configuration.
    Curated,
    ReferenceIndex,
    ExternalApi,
    /// The external lookup failed (timeout, outage); the status degraded to unresolved.
    ExternalFailure,
    /// Empty query after normalization; nothing was looked up.
    Empty,
}

/// Result of resolving one normalized query.
///
/// `identifier` and `canonical_name` are populated only for
/// [`ResolutionStatus::Resolved`]; `candidates` lists the competing identifiers
/// behind an [`ResolutionStatus::Ambiguous`] outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionEntry {
    pub query: String,
    pub status: ResolutionStatus,
    pub identifier: Option<String>,
    pub canonical_name: Option<String>,
    pub candidates: Vec<String>,
    pub source: ResolutionSource,
    pub resolved_at: DateTime<Utc>,
}

impl ResolutionEntry {
    #[must_use]
    pub fn resolved(query: impl Into<String>, record: &ChemicalRecord, source: ResolutionSource) -> Self {
        Self {
            query: query.into(),
            status: ResolutionStatus::Resolved,
            identifier: Some(record.identifier.clone()),
            canonical_name: Some(record.canonical_name.clone()),
            candidates: Vec::new(),
            source,
            resolved_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn ambiguous(query: impl Into<String>, candidates: Vec<String>, source: ResolutionSource) -> Self {
        Self {
            query: query.into(),
            status: ResolutionStatus::Ambiguous,
            identifier: None,
            canonical_name: None,
            candidates,
            source,
            resolved_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn unresolved(query: impl Into<String>, source: ResolutionSource) -> Self {
        Self {
            query: query.into(),
            status: ResolutionStatus::Unresolved,
            identifier: None,
            canonical_name: None,
            candidates: Vec::new(),
            source,
            resolved_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status == ResolutionStatus::Resolved
    }

    /// Equality on everything except `resolved_at`.
    #[must_use]
    pub fn same_outcome(&self, other: &Self) -> bool {
        self.query == other.query
            && self.status == other.status
            && self.identifier == other.identifier
            && self.canonical_name == other.canonical_name
            && self.candidates == other.candidates
            && self.source == other.source
    }
}
