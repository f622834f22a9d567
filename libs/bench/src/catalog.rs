//! Shard catalog: maps a dataset's flat shard files onto global row ranges.
//!
//! Building a catalog only reads the small JSON metadata sidecar and `stat`s
//! the shard files. Row counts are inferred from file sizes
//! (`bytes / 4 / dim`), so a shard whose size is not a whole number of rows is
//! rejected up front.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layout::{compare_labels, DatasetLayout};

/// Bytes per stored element (little-endian f32).
pub const BYTES_PER_ELEMENT: u64 = 4;

/// One physical shard file and the global rows it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardDescriptor {
    pub path: PathBuf,
    /// First global row (inclusive).
    pub start: u64,
    /// Rows stored in this shard.
    pub count: u64,
}

impl ShardDescriptor {
    /// One past the last global row.
    pub fn end(&self) -> u64 {
        self.start + self.count
    }

    pub fn contains(&self, row: u64) -> bool {
        row >= self.start && row < self.end()
    }
}

/// Scalar metadata read from `<prefix>-<label>.meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub dim: usize,
    #[serde(default = "default_dtype")]
    pub dtype: String,
    /// Rows written by the producer; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Nominal rows per shard; used for planning, never for correctness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_size: Option<u64>,
}

fn default_dtype() -> String {
    "float32".to_string()
}

impl DatasetMeta {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            dtype: default_dtype(),
            count: None,
            shard_size: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let meta: Self = serde_json::from_str(&content).map_err(|e| Error::InvalidMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        meta.validate(path)?;
        Ok(meta)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.dim == 0 {
            return Err(Error::InvalidMetadata {
                path: path.to_path_buf(),
                reason: "dim must be positive".into(),
            });
        }
        if self.dtype != "float32" {
            return Err(Error::InvalidMetadata {
                path: path.to_path_buf(),
                reason: format!("unsupported dtype '{}', expected float32", self.dtype),
            });
        }
        Ok(())
    }
}

/// Immutable description of a dataset's shards for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardCatalog {
    pub label: String,
    pub dim: usize,
    shards: Vec<ShardDescriptor>,
    total_rows: u64,
}

/// A catalog together with the ground truth it will be scored against.
#[derive(Debug, Clone)]
pub struct ResolvedDataset {
    pub catalog: ShardCatalog,
    pub ground_truth_path: PathBuf,
    pub meta: DatasetMeta,
}

impl ShardCatalog {
    /// Build a catalog from explicit descriptors.
    ///
    /// Fails unless the shards are contiguous from row 0.
    pub fn from_shards(
        label: impl Into<String>,
        dim: usize,
        shards: Vec<ShardDescriptor>,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidArgument("dim must be positive".into()));
        }
        let mut expected = 0u64;
        for shard in &shards {
            if shard.start != expected {
                return Err(Error::corrupt_shard(
                    &shard.path,
                    format!("starts at row {} but previous shard ends at {}", shard.start, expected),
                ));
            }
            expected = shard.end();
        }
        Ok(Self {
            label: label.into(),
            dim,
            shards,
            total_rows: expected,
        })
    }

    /// Catalog the newest dataset in `dir` without requiring ground truth.
    ///
    /// This is what the ground-truth generation pass uses.
    pub fn scan(dir: &Path, layout: &DatasetLayout) -> Result<(Self, DatasetMeta)> {
        if !dir.is_dir() {
            return Err(Error::DatasetNotFound {
                dir: dir.to_path_buf(),
                reason: "not a directory".into(),
            });
        }
        let names = list_file_names(dir)?;

        let label = names
            .iter()
            .filter_map(|n| layout.meta_label(n))
            .max_by(|a, b| compare_labels(a, b))
            .map(str::to_string)
            .ok_or_else(|| Error::DatasetNotFound {
                dir: dir.to_path_buf(),
                reason: format!("no {}-*.meta.json sidecar", layout.prefix),
            })?;

        let meta_path = layout.meta_path(dir, &label);
        let meta = DatasetMeta::load(&meta_path)?;

        let mut indexed: Vec<(usize, PathBuf)> = names
            .iter()
            .filter_map(|n| match layout.parse_shard(n) {
                Some((shard_label, index)) if shard_label == label => Some((index, dir.join(n))),
                _ => None,
            })
            .collect();
        if indexed.is_empty() {
            return Err(Error::DatasetNotFound {
                dir: dir.to_path_buf(),
                reason: format!("no shard files for label '{}'", label),
            });
        }
        indexed.sort_by_key(|(index, _)| *index);
        if let Some(pair) = indexed.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(Error::corrupt_shard(
                &pair[1].1,
                format!("duplicate shard index {}", pair[1].0),
            ));
        }

        let row_bytes = meta.dim as u64 * BYTES_PER_ELEMENT;
        let mut shards = Vec::with_capacity(indexed.len());
        let mut start = 0u64;
        for (_, path) in indexed {
            let size = fs::metadata(&path).map_err(|e| Error::io(&path, e))?.len();
            if size % row_bytes != 0 {
                return Err(Error::corrupt_shard(
                    &path,
                    format!(
                        "size {} bytes is not a multiple of dim*4 = {}",
                        size, row_bytes
                    ),
                ));
            }
            let count = size / row_bytes;
            shards.push(ShardDescriptor { path, start, count });
            start += count;
        }

        let catalog = Self::from_shards(label, meta.dim, shards)?;
        if let Some(declared) = meta.count {
            if declared != catalog.total_rows {
                tracing::warn!(
                    declared,
                    actual = catalog.total_rows,
                    label = %catalog.label,
                    "metadata row count disagrees with shard sizes"
                );
            }
        }
        tracing::info!(
            label = %catalog.label,
            dim = catalog.dim,
            shards = catalog.shards.len(),
            rows = catalog.total_rows,
            "[dataset] catalog resolved"
        );
        Ok((catalog, meta))
    }

    /// Catalog the newest dataset in `dir` and locate its ground truth.
    ///
    /// The ground truth must carry the same label as the metadata sidecar.
    pub fn resolve(dir: &Path, layout: &DatasetLayout) -> Result<ResolvedDataset> {
        let (catalog, meta) = Self::scan(dir, layout)?;
        let names = list_file_names(dir)?;
        let found = names
            .iter()
            .any(|n| layout.ground_truth_label(n) == Some(catalog.label.as_str()));
        if !found {
            return Err(Error::GroundTruthNotFound {
                dir: dir.to_path_buf(),
                label: catalog.label.clone(),
            });
        }
        let ground_truth_path = layout.ground_truth_path(dir, &catalog.label);
        Ok(ResolvedDataset {
            catalog,
            ground_truth_path,
            meta,
        })
    }

    pub fn shards(&self) -> &[ShardDescriptor] {
        &self.shards
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Shard index and local row for a global row.
    pub fn locate(&self, row: u64) -> Option<(usize, u64)> {
        if row >= self.total_rows {
            return None;
        }
        // First shard whose end is past `row`; zero-row shards are skipped
        // naturally because their end equals the next shard's start.
        let idx = self.shards.partition_point(|s| s.end() <= row);
        let shard = self.shards.get(idx)?;
        Some((idx, row - shard.start))
    }

    /// Fail with `QueryOutOfRange` unless every id is a valid global row.
    pub fn check_rows(&self, rows: &[u64]) -> Result<()> {
        match rows.iter().find(|&&id| id >= self.total_rows) {
            Some(&id) => Err(Error::QueryOutOfRange {
                id,
                total_rows: self.total_rows,
            }),
            None => Ok(()),
        }
    }
}

fn list_file_names(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_meta(dir: &Path, layout: &DatasetLayout, label: &str, dim: usize) {
        fs::write(
            layout.meta_path(dir, label),
            serde_json::to_string(&DatasetMeta::new(dim)).unwrap(),
        )
        .unwrap();
    }

    fn write_shard(dir: &Path, layout: &DatasetLayout, label: &str, index: usize, bytes: usize) {
        fs::write(layout.shard_path(dir, label, index), vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn test_scan_infers_counts_and_orders_numerically() {
        let temp = TempDir::new().unwrap();
        let layout = DatasetLayout::default();
        write_meta(temp.path(), &layout, "100", 2);
        // shard10 must come after shard2
        fs::write(temp.path().join("msmarco-passages-100.shard10.f32"), vec![0u8; 8 * 3]).unwrap();
        fs::write(temp.path().join("msmarco-passages-100.shard2.f32"), vec![0u8; 8 * 5]).unwrap();

        let (catalog, meta) = ShardCatalog::scan(temp.path(), &layout).unwrap();
        assert_eq!(meta.dim, 2);
        assert_eq!(catalog.num_shards(), 2);
        assert!(catalog.shards()[0].path.ends_with("msmarco-passages-100.shard2.f32"));
        assert_eq!(catalog.shards()[0].count, 5);
        assert_eq!(catalog.shards()[1].start, 5);
        assert_eq!(catalog.shards()[1].count, 3);
        assert_eq!(catalog.total_rows(), 8);
    }

    #[test]
    fn test_scan_picks_newest_label() {
        let temp = TempDir::new().unwrap();
        let layout = DatasetLayout::default();
        write_meta(temp.path(), &layout, "2", 4);
        write_meta(temp.path(), &layout, "10", 4);
        write_shard(temp.path(), &layout, "2", 0, 16);
        write_shard(temp.path(), &layout, "10", 0, 32);

        let (catalog, _) = ShardCatalog::scan(temp.path(), &layout).unwrap();
        assert_eq!(catalog.label, "10");
        assert_eq!(catalog.total_rows(), 2);
    }

    #[test]
    fn test_missing_meta_is_dataset_not_found() {
        let temp = TempDir::new().unwrap();
        let layout = DatasetLayout::default();
        write_shard(temp.path(), &layout, "1", 0, 16);
        let err = ShardCatalog::scan(temp.path(), &layout).unwrap_err();
        assert!(matches!(err, Error::DatasetNotFound { .. }));
    }

    #[test]
    fn test_missing_ground_truth() {
        let temp = TempDir::new().unwrap();
        let layout = DatasetLayout::default();
        write_meta(temp.path(), &layout, "1", 4);
        write_shard(temp.path(), &layout, "1", 0, 16);
        // ground truth for another label does not count
        fs::write(layout.ground_truth_path(temp.path(), "2"), "").unwrap();

        let err = ShardCatalog::resolve(temp.path(), &layout).unwrap_err();
        assert!(matches!(err, Error::GroundTruthNotFound { ref label, .. } if label == "1"));

        fs::write(layout.ground_truth_path(temp.path(), "1"), "").unwrap();
        let resolved = ShardCatalog::resolve(temp.path(), &layout).unwrap();
        assert!(resolved.ground_truth_path.ends_with("msmarco-passages-1.gt.jsonl"));
    }

    #[test]
    fn test_size_not_multiple_of_row_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let layout = DatasetLayout::default();
        write_meta(temp.path(), &layout, "1", 4);
        write_shard(temp.path(), &layout, "1", 0, 17);
        let err = ShardCatalog::scan(temp.path(), &layout).unwrap_err();
        assert!(matches!(err, Error::CorruptShard { .. }));
    }

    #[test]
    fn test_bad_meta() {
        let temp = TempDir::new().unwrap();
        let layout = DatasetLayout::default();
        fs::write(layout.meta_path(temp.path(), "1"), r#"{"dim": 0}"#).unwrap();
        write_shard(temp.path(), &layout, "1", 0, 16);
        let err = ShardCatalog::scan(temp.path(), &layout).unwrap_err();
        assert!(matches!(err, Error::InvalidMetadata { .. }));

        fs::write(layout.meta_path(temp.path(), "1"), r#"{"dim": 4, "dtype": "float16"}"#).unwrap();
        let err = ShardCatalog::scan(temp.path(), &layout).unwrap_err();
        assert!(matches!(err, Error::InvalidMetadata { .. }));
    }

    #[test]
    fn test_locate_and_check_rows() {
        let shards = vec![
            ShardDescriptor { path: "a".into(), start: 0, count: 10 },
            ShardDescriptor { path: "b".into(), start: 10, count: 0 },
            ShardDescriptor { path: "c".into(), start: 10, count: 5 },
        ];
        let catalog = ShardCatalog::from_shards("t", 4, shards).unwrap();
        assert_eq!(catalog.locate(0), Some((0, 0)));
        assert_eq!(catalog.locate(9), Some((0, 9)));
        assert_eq!(catalog.locate(10), Some((2, 0)));
        assert_eq!(catalog.locate(14), Some((2, 4)));
        assert_eq!(catalog.locate(15), None);

        assert!(catalog.check_rows(&[0, 14]).is_ok());
        assert!(matches!(
            catalog.check_rows(&[3, 15]),
            Err(Error::QueryOutOfRange { id: 15, total_rows: 15 })
        ));
    }

    #[test]
    fn test_from_shards_rejects_gaps() {
        let shards = vec![
            ShardDescriptor { path: "a".into(), start: 0, count: 10 },
            ShardDescriptor { path: "b".into(), start: 11, count: 5 },
        ];
        assert!(matches!(
            ShardCatalog::from_shards("t", 4, shards),
            Err(Error::CorruptShard { .. })
        ));
    }
}
