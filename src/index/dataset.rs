//! Readers for the bulk reference datasets an index is built from.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::BUILD_LOG_INTERVAL;
use crate::error::{ChemlinkError, Result};
use crate::types::ChemicalRecord;

/// Layout of a reference dataset on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    /// `identifier<TAB>synonym` per line, rows for one identifier grouped and
    /// the preferred name first (PubChem `CID-Synonym-filtered`).
    Tsv,
    /// One JSON object per line with `identifier`, `canonical_name` and
    /// optional `synonyms` and `formula`.
    JsonLines,
}

impl DatasetFormat {
    /// Guess the format from the file extension. Unknown extensions (the
    /// PubChem dump ships without one) are treated as TSV.
    #[must_use]
    pub fn detect(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jsonl" | "ndjson") => Self::JsonLines,
            _ => Self::Tsv,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonLine {
    identifier: String,
    canonical_name: String,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    formula: Option<String>,
}

/// Records in first-seen order, keyed by identifier for grouping.
#[derive(Default)]
struct Grouper {
    positions: HashMap<String, usize>,
    records: Vec<ChemicalRecord>,
}

impl Grouper {
    fn entry(&mut self, identifier: &str, canonical_name: &str) -> &mut ChemicalRecord {
        let next = self.records.len();
        let pos = *self
            .positions
            .entry(identifier.to_string())
            .or_insert(next);
        if pos == next {
            self.records
                .push(ChemicalRecord::new(identifier, canonical_name));
        }
        &mut self.records[pos]
    }

    fn finish(self) -> Vec<ChemicalRecord> {
        self.records
            .into_iter()
            .map(|mut record| {
                let canonical = record.canonical_name.clone();
                record.synonyms.retain(|s| *s != canonical);
                record.synonyms.sort();
                record.synonyms.dedup();
                record
            })
            .collect()
    }
}

fn build_error(path: &Path, line: usize, reason: impl Into<Cow<'static, str>>) -> ChemlinkError {
    ChemlinkError::Build {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// Read every record from `path`, grouping rows that share an identifier.
pub fn read_dataset(path: &Path, format: DatasetFormat) -> Result<Vec<ChemicalRecord>> {
    let file = fs_err::File::open(path)
        .map_err(|err| build_error(path, 0, format!("cannot open dataset: {err}")))?;
    let reader = BufReader::new(file);
    let mut grouper = Grouper::default();
    let mut rows = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|err| build_error(path, line_no, format!("read failed: {err}")))?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        match format {
            DatasetFormat::Tsv => {
                let mut columns = line.split('\t');
                let (Some(id), Some(synonym), None) = (columns.next(), columns.next(), columns.next())
                else {
                    return Err(build_error(path, line_no, "expected identifier<TAB>synonym"));
                };
                let (id, synonym) = (id.trim(), synonym.trim());
                if id.is_empty() || synonym.is_empty() {
                    return Err(build_error(path, line_no, "empty identifier or synonym column"));
                }
                grouper.entry(id, synonym).synonyms.push(synonym.to_string());
            }
            DatasetFormat::JsonLines => {
                let parsed: JsonLine = serde_json::from_str(line)
                    .map_err(|err| build_error(path, line_no, format!("invalid JSON record: {err}")))?;
                if parsed.identifier.trim().is_empty() || parsed.canonical_name.trim().is_empty() {
                    return Err(build_error(path, line_no, "empty identifier or canonical_name"));
                }
                let record = grouper.entry(parsed.identifier.trim(), parsed.canonical_name.trim());
                record.synonyms.extend(parsed.synonyms);
                if record.formula.is_none() {
                    record.formula = parsed.formula;
                }
            }
        }
        rows += 1;
        if rows % BUILD_LOG_INTERVAL == 0 {
            tracing::info!(
                dataset.rows = rows,
                dataset.records = grouper.records.len(),
                "reading reference dataset"
            );
        }
    }

    let records = grouper.finish();
    if records.is_empty() {
        return Err(build_error(path, 0, "dataset contains no entries"));
    }
    tracing::debug!(dataset.rows = rows, dataset.records = records.len(), "dataset read");
    Ok(records)
}
