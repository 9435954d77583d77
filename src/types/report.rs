//! Validation report returned by the reconciler.

use serde::{Deserialize, Serialize};

use super::resolution::ResolutionStatus;

/// One violation, addressed by dot path (`processes[0].aldSystem.materialDeposited`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

/// A field left for human review because its name did not resolve cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub path: String,
    pub raw_text: String,
    pub status: ResolutionStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    /// Every violation found, in discovery order.
    pub errors: Vec<FieldError>,
    #[serde(default)]
    pub review: Vec<ReviewItem>,
}

impl ValidationReport {
    #[must_use]
    pub fn error_paths(&self) -> Vec<&str> {
        self.errors.iter().map(|err| err.path.as_str()).collect()
    }

    #[must_use]
    pub fn needs_review(&self) -> bool {
        !self.review.is_empty()
    }

    /// Plain-text rendering for logs and review tooling.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "valid: {} ({} errors, {} fields for review)\n",
            self.is_valid,
            self.errors.len(),
            self.review.len()
        );
        for err in &self.errors {
            out.push_str(&format!("  error  {}: {}\n", display_path(&err.path), err.message));
        }
        for item in &self.review {
            out.push_str(&format!(
                "  review {}: {:?} ({})\n",
                display_path(&item.path),
                item.raw_text,
                item.status.label()
            ));
        }
        out
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "(root)" } else { path }
}
