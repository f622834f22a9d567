//! Producing sharded datasets.
//!
//! [`ShardWriter`] appends rows to rolling `.f32` shard files of a fixed row
//! count and finishes by writing the metadata sidecar. Completed shards are
//! fsynced before the next one is started.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use shardbench_core::distance;

use crate::catalog::{DatasetMeta, ShardCatalog, ShardDescriptor};
use crate::error::{Error, Result};
use crate::layout::DatasetLayout;

pub const DEFAULT_SHARD_SIZE: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterOptions {
    /// Rows per shard; the last shard may be shorter.
    pub shard_size: u64,
    /// L2-normalise rows before writing.
    pub normalize: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            shard_size: DEFAULT_SHARD_SIZE,
            normalize: false,
        }
    }
}

impl WriterOptions {
    pub fn with_shard_size(mut self, shard_size: u64) -> Self {
        self.shard_size = shard_size;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

struct OpenShard {
    path: PathBuf,
    out: BufWriter<File>,
    start: u64,
    rows: u64,
}

/// Writes one dataset label into `dir`.
pub struct ShardWriter {
    dir: PathBuf,
    layout: DatasetLayout,
    label: String,
    dim: usize,
    options: WriterOptions,
    current: Option<OpenShard>,
    finished: Vec<ShardDescriptor>,
    rows: u64,
    scratch: Vec<f32>,
}

impl ShardWriter {
    pub fn create(
        dir: &Path,
        layout: DatasetLayout,
        label: impl Into<String>,
        dim: usize,
        options: WriterOptions,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidArgument("dim must be positive".into()));
        }
        if options.shard_size == 0 {
            return Err(Error::InvalidArgument("shard_size must be positive".into()));
        }
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            layout,
            label: label.into(),
            dim,
            options,
            current: None,
            finished: Vec::new(),
            rows: 0,
            scratch: Vec::with_capacity(dim),
        })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Append one row.
    pub fn write_row(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: row.len(),
            });
        }
        if self.current.as_ref().map_or(true, |s| s.rows >= self.options.shard_size) {
            self.roll()?;
        }

        let values: &[f32] = if self.options.normalize {
            self.scratch.clear();
            self.scratch.extend_from_slice(row);
            distance::normalize(&mut self.scratch);
            &self.scratch
        } else {
            row
        };

        let Some(shard) = self.current.as_mut() else {
            return Err(Error::InvalidArgument("no open shard".into()));
        };
        for &v in values {
            shard
                .out
                .write_f32::<LittleEndian>(v)
                .map_err(|e| Error::io(&shard.path, e))?;
        }
        shard.rows += 1;
        self.rows += 1;
        Ok(())
    }

    /// Append `rows.len() / dim` rows stored row-major.
    pub fn write_rows(&mut self, rows: &[f32]) -> Result<()> {
        if rows.len() % self.dim != 0 {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: rows.len() % self.dim,
            });
        }
        for row in rows.chunks_exact(self.dim) {
            self.write_row(row)?;
        }
        Ok(())
    }

    fn roll(&mut self) -> Result<()> {
        self.close_current()?;
        let index = self.finished.len();
        let path = self.layout.shard_path(&self.dir, &self.label, index);
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        tracing::debug!(path = %path.display(), start = self.rows, "opened shard for writing");
        self.current = Some(OpenShard {
            path,
            out: BufWriter::new(file),
            start: self.rows,
            rows: 0,
        });
        Ok(())
    }

    fn close_current(&mut self) -> Result<()> {
        let Some(shard) = self.current.take() else {
            return Ok(());
        };
        let file = shard
            .out
            .into_inner()
            .map_err(|e| Error::io(&shard.path, e.into_error()))?;
        file.sync_all().map_err(|e| Error::io(&shard.path, e))?;
        tracing::info!(path = %shard.path.display(), rows = shard.rows, "[write] shard complete");
        self.finished.push(ShardDescriptor {
            path: shard.path,
            start: shard.start,
            count: shard.rows,
        });
        Ok(())
    }

    /// Flush the last shard, write the metadata sidecar and return the
    /// catalog of what was written.
    pub fn finish(mut self) -> Result<ShardCatalog> {
        self.close_current()?;
        let meta = DatasetMeta {
            dim: self.dim,
            dtype: "float32".to_string(),
            count: Some(self.rows),
            shard_size: Some(self.options.shard_size),
        };
        let meta_path = self.layout.meta_path(&self.dir, &self.label);
        write_json_atomic(&meta_path, &meta)?;
        tracing::info!(
            path = %meta_path.display(),
            rows = self.rows,
            shards = self.finished.len(),
            "[write] dataset complete"
        );
        ShardCatalog::from_shards(self.label, self.dim, self.finished)
    }
}

/// Serialize `value` as pretty JSON to `path` through a temp file and rename.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    write_atomic(path, content.as_bytes())
}

/// Write `content` to `path` through a synced `<name>.tmp` and rename.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    let tmp = path.with_file_name(name);
    let mut file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
    file.write_all(content).map_err(|e| Error::io(&tmp, e))?;
    file.sync_all().map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{CorpusStream, StreamOptions};
    use tempfile::TempDir;

    #[test]
    fn test_rolls_shards_and_scans_back() {
        let dir = TempDir::new().unwrap();
        let layout = DatasetLayout::default();
        let mut writer = ShardWriter::create(
            dir.path(),
            layout.clone(),
            "7",
            2,
            WriterOptions::default().with_shard_size(3),
        )
        .unwrap();
        for i in 0..7 {
            writer.write_row(&[i as f32, -(i as f32)]).unwrap();
        }
        let written = writer.finish().unwrap();
        let counts: Vec<u64> = written.shards().iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![3, 3, 1]);

        let (scanned, meta) = ShardCatalog::scan(dir.path(), &layout).unwrap();
        assert_eq!(scanned, written);
        assert_eq!(meta.count, Some(7));
        assert_eq!(meta.shard_size, Some(3));

        let mut stream = CorpusStream::new(&scanned, StreamOptions::default().with_start_offset(6)).unwrap();
        let batch = stream.next_batch().unwrap().unwrap();
        assert_eq!(batch.rows, &[6.0, -6.0]);
    }

    #[test]
    fn test_normalize_and_dimension_check() {
        let dir = TempDir::new().unwrap();
        let mut writer = ShardWriter::create(
            dir.path(),
            DatasetLayout::default(),
            "n",
            2,
            WriterOptions::default().with_normalize(true),
        )
        .unwrap();
        writer.write_rows(&[3.0, 4.0, 0.0, 0.0]).unwrap();
        assert!(matches!(writer.write_row(&[1.0]), Err(Error::DimensionMismatch { .. })));
        let catalog = writer.finish().unwrap();

        let bytes = fs::read(&catalog.shards()[0].path).unwrap();
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert!((values[0] - 0.6).abs() < 1e-6);
        assert!((values[1] - 0.8).abs() < 1e-6);
        assert_eq!(&values[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_empty_dataset_has_no_shards() {
        let dir = TempDir::new().unwrap();
        let writer = ShardWriter::create(dir.path(), DatasetLayout::default(), "e", 4, WriterOptions::default()).unwrap();
        let catalog = writer.finish().unwrap();
        assert_eq!(catalog.num_shards(), 0);
        assert_eq!(catalog.total_rows(), 0);
    }
}
