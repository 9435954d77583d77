//! External chemical-database lookups.
//!
//! [`CompoundSource`] is the seam the resolver calls when local sources miss.
//! The PubChem PUG REST response models live here unconditionally; the HTTP
//! client itself requires the `pubchem` feature.

#[cfg(feature = "pubchem")]
mod client;

use std::thread;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "pubchem")]
pub use client::PubChemClient;

use crate::types::{ChemicalRecord, PubChemOptions, SearchMode};

/// A record proposed by an external search, tagged with the mode that found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub record: ChemicalRecord,
    pub mode: SearchMode,
}

impl Candidate {
    #[must_use]
    pub fn new(record: ChemicalRecord, mode: SearchMode) -> Self {
        Self { record, mode }
    }
}

/// Failure talking to an external chemical database.
///
/// A search that completes with zero hits is `Ok(vec![])`, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("unexpected HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl LookupError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// External source of chemical candidates (PubChem or a test double).
pub trait CompoundSource: Send + Sync {
    /// Search for `query` (the caller's text, case preserved) in `mode`.
    fn search(&self, query: &str, mode: SearchMode) -> Result<Vec<Candidate>, LookupError>;
}

/// Bounded exponential backoff for transient lookup failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each one after.
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_options(options: &PubChemOptions) -> Self {
        Self {
            max_retries: options.max_retries,
            backoff: Duration::from_millis(options.backoff_ms),
        }
    }

    pub fn run<T>(
        &self,
        label: &str,
        mut op: impl FnMut() -> Result<T, LookupError>,
    ) -> Result<T, LookupError> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff.saturating_mul(1u32 << attempt.min(16));
                    attempt += 1;
                    tracing::debug!(
                        request = label,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "retrying external lookup"
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// `compound/.../synonyms/JSON` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct SynonymsResponse {
    #[serde(rename = "InformationList")]
    pub information_list: InformationList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InformationList {
    #[serde(rename = "Information", default)]
    pub information: Vec<SynonymInformation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynonymInformation {
    #[serde(rename = "CID")]
    pub cid: u64,
    #[serde(rename = "Synonym", default)]
    pub synonyms: Vec<String>,
}

impl SynonymsResponse {
    /// One record per compound; PubChem lists the preferred name first.
    /// Compounds without any synonym carry no usable name and are dropped.
    #[must_use]
    pub fn into_records(self) -> Vec<ChemicalRecord> {
        self.information_list
            .information
            .into_iter()
            .filter_map(|info| {
                let mut names = info.synonyms.into_iter();
                let canonical = names.next()?;
                Some(ChemicalRecord::new(info.cid.to_string(), canonical).with_synonyms(names))
            })
            .collect()
    }
}

/// `compound/cid/.../property/.../JSON` response body.
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyResponse {
    #[serde(rename = "PropertyTable")]
    pub property_table: PropertyTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyTable {
    #[serde(rename = "Properties", default)]
    pub properties: Vec<CompoundProperties>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompoundProperties {
    #[serde(rename = "CID")]
    pub cid: u64,
    #[serde(rename = "MolecularFormula", default)]
    pub molecular_formula: Option<String>,
    #[serde(rename = "IUPACName", default)]
    pub iupac_name: Option<String>,
}

/// Error body PUG REST sends with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct FaultResponse {
    #[serde(rename = "Fault")]
    pub fault: Fault,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fault {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Details", default)]
    pub details: Vec<String>,
}

impl Fault {
    #[must_use]
    pub fn summary(&self) -> String {
        if self.details.is_empty() {
            format!("{}: {}", self.code, self.message)
        } else {
            format!("{}: {} ({})", self.code, self.message, self.details.join("; "))
        }
    }
}

/// Element symbols with optional counts, optionally grouped and hydrated
/// (`Al2O3`, `Zn(C2H5)2`, `CuSO4·5H2O`).
static FORMULA_SHAPE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Z][a-z]?\d*|\((?:[A-Z][a-z]?\d*)+\)\d*)+(?:[·.]\d*(?:[A-Z][a-z]?\d*)+)*$").ok()
});

/// Whether `query` could be a molecular formula. PubChem rejects formula
/// searches for anything else with a 400.
#[must_use]
pub fn looks_like_formula(query: &str) -> bool {
    let compact: String = query.chars().filter(|c| !c.is_whitespace()).collect();
    !compact.is_empty()
        && FORMULA_SHAPE
            .as_ref()
            .is_some_and(|shape| shape.is_match(&compact))
}
