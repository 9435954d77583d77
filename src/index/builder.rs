use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::dataset::{DatasetFormat, read_dataset};
use crate::error::{ChemlinkError, Result};
use crate::io::index_file::write_index;
use crate::text::normalize_name;
use crate::types::ChemicalRecord;

/// Summary of an index build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBuildStats {
    pub records: u64,
    pub keys: u64,
    /// Keys claimed by more than one record; the later record kept the key.
    pub collisions: u64,
    /// Names that normalized to the empty string and were not indexed.
    pub skipped_names: u64,
    pub elapsed_ms: u64,
}

/// Builds a reference index file from a bulk dataset or in-memory records.
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    format: Option<DatasetFormat>,
}

impl IndexBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a dataset format instead of detecting it from the extension.
    #[must_use]
    pub fn format(mut self, format: DatasetFormat) -> Self {
        self.format = Some(format);
        self
    }

    #[tracing::instrument(skip(self), fields(dataset = %dataset.display(), index = %index_path.display()))]
    pub fn build(&self, dataset: &Path, index_path: &Path) -> Result<IndexBuildStats> {
        let format = self.format.unwrap_or_else(|| DatasetFormat::detect(dataset));
        let records = read_dataset(dataset, format)?;
        self.build_from_records(&records, index_path)
    }

    /// Index `records` directly. Every canonical name and synonym becomes a
    /// normalized key; on collision the record appearing later wins.
    pub fn build_from_records(
        &self,
        records: &[ChemicalRecord],
        index_path: &Path,
    ) -> Result<IndexBuildStats> {
        let started = Instant::now();
        if records.is_empty() {
            return Err(ChemlinkError::Build {
                path: index_path.to_path_buf(),
                line: 0,
                reason: "no records to index".into(),
            });
        }

        let mut keys: BTreeMap<String, usize> = BTreeMap::new();
        let mut stats = IndexBuildStats {
            records: records.len() as u64,
            ..IndexBuildStats::default()
        };
        for (pos, record) in records.iter().enumerate() {
            for name in record.names() {
                let key = normalize_name(name);
                if key.is_empty() {
                    stats.skipped_names += 1;
                    continue;
                }
                if let Some(previous) = keys.insert(key, pos) {
                    if previous != pos {
                        stats.collisions += 1;
                    }
                }
            }
        }
        if keys.is_empty() {
            return Err(ChemlinkError::Build {
                path: index_path.to_path_buf(),
                line: 0,
                reason: "every name normalized to an empty key".into(),
            });
        }

        let header = write_index(
            index_path,
            records,
            keys.iter().map(|(key, pos)| (key.as_str(), *pos)),
        )?;
        stats.keys = header.key_count;
        stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if stats.collisions > 0 {
            tracing::warn!(
                collisions = stats.collisions,
                "names shared by several records; later records kept the key"
            );
        }
        tracing::info!(
            records = stats.records,
            keys = stats.keys,
            elapsed_ms = stats.elapsed_ms,
            "reference index built"
        );
        Ok(stats)
    }
}
