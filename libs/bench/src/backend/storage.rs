//! On-disk vector file and manifest shared by the reference backends.
//!
//! ```text
//! <store>/manifest.json   backend, dim, metric, rows, index params
//! <store>/vectors.f32     rows in id order, little-endian f32
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{IndexParams, SearchHit};
use crate::error::{BackendOp, Error, Result};
use crate::metric::{Metric, PreparedQueries};
use crate::topk::BoundedTopK;
use crate::writer::write_json_atomic;

pub(crate) const MANIFEST_FILE: &str = "manifest.json";
pub(crate) const VECTORS_FILE: &str = "vectors.f32";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Manifest {
    pub backend: String,
    pub dim: usize,
    pub metric: Metric,
    pub rows: u64,
    #[serde(default)]
    pub index: Option<IndexParams>,
}

/// All rows of a store, in memory and appended to `vectors.f32`.
pub(crate) struct VectorFile {
    dir: PathBuf,
    pub dim: usize,
    pub metric: Metric,
    data: Vec<f32>,
    out: BufWriter<File>,
}

impl VectorFile {
    /// Start an empty store, discarding the files of a previous one.
    pub fn create(dir: &Path, dim: usize, metric: Metric, extra_files: &[&str]) -> Result<Self> {
        if dim == 0 {
            return Err(Error::backend(BackendOp::Create, "dim must be positive"));
        }
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        for name in [MANIFEST_FILE].iter().chain(extra_files) {
            let path = dir.join(name);
            if path.exists() {
                fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
            }
        }
        let path = dir.join(VECTORS_FILE);
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            dim,
            metric,
            data: Vec::new(),
            out: BufWriter::new(file),
        })
    }

    /// Load a closed store and check it was written by `backend`.
    pub fn open(dir: &Path, backend: &str) -> Result<(Self, Manifest)> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest_path)
            .map_err(|e| Error::backend(BackendOp::Open, format!("{}: {}", manifest_path.display(), e)))?;
        let manifest: Manifest = serde_json::from_str(&content)?;
        if manifest.backend != backend {
            return Err(Error::backend(
                BackendOp::Open,
                format!("store at {} was written by '{}'", dir.display(), manifest.backend),
            ));
        }

        let path = dir.join(VECTORS_FILE);
        let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        let expected = manifest.rows as usize * manifest.dim * 4;
        if bytes.len() != expected {
            return Err(Error::backend(
                BackendOp::Open,
                format!(
                    "{} holds {} bytes, manifest expects {}",
                    path.display(),
                    bytes.len(),
                    expected
                ),
            ));
        }
        let data: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        Ok((
            Self {
                dir: dir.to_path_buf(),
                dim: manifest.dim,
                metric: manifest.metric,
                data,
                out: BufWriter::new(file),
            },
            manifest,
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> u64 {
        (self.data.len() / self.dim) as u64
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, id: u64) -> &[f32] {
        let start = id as usize * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Ids must continue the existing sequence.
    pub fn append(&mut self, first_id: u64, rows: &[f32]) -> Result<()> {
        if rows.len() % self.dim != 0 {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: rows.len() % self.dim,
            });
        }
        if first_id != self.len() {
            return Err(Error::backend(
                BackendOp::Insert,
                format!("batch starts at id {} but store holds {} rows", first_id, self.len()),
            ));
        }
        let path = self.dir.join(VECTORS_FILE);
        self.out
            .write_all(bytemuck::cast_slice(rows))
            .map_err(|e| Error::io(&path, e))?;
        self.data.extend_from_slice(rows);
        Ok(())
    }

    pub fn check_query(&self, query: &[f32]) -> Result<()> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: query.len(),
            });
        }
        Ok(())
    }

    /// Exact top-k over every row.
    pub fn top_k_all(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let prepared = PreparedQueries::new(self.metric, query, self.dim);
        let mut scores = Vec::new();
        prepared.score_block(&self.data, &mut scores);
        let mut topk = BoundedTopK::new(k);
        for (id, &score) in scores.iter().enumerate() {
            topk.offer(id as u64, score);
        }
        into_hits(topk)
    }

    /// Exact top-k over the given candidate ids.
    pub fn top_k_among<'a>(&self, query: &[f32], k: usize, ids: impl Iterator<Item = &'a u64>) -> Vec<SearchHit> {
        // same scores as top_k_all
        let prepared = PreparedQueries::new(self.metric, query, self.dim);
        let mut score = Vec::with_capacity(1);
        let mut topk = BoundedTopK::new(k);
        for &id in ids {
            prepared.score_block(self.row(id), &mut score);
            topk.offer(id, score[0]);
        }
        into_hits(topk)
    }

    /// Flush vectors and write the manifest.
    pub fn persist(&mut self, backend: &str, index: Option<IndexParams>) -> Result<()> {
        let path = self.dir.join(VECTORS_FILE);
        self.out.flush().map_err(|e| Error::io(&path, e))?;
        self.out.get_ref().sync_all().map_err(|e| Error::io(&path, e))?;
        let manifest = Manifest {
            backend: backend.to_string(),
            dim: self.dim,
            metric: self.metric,
            rows: self.len(),
            index,
        };
        write_json_atomic(&self.dir.join(MANIFEST_FILE), &manifest)
    }
}

fn into_hits(topk: BoundedTopK) -> Vec<SearchHit> {
    topk.into_sorted()
        .into_iter()
        .map(|n| SearchHit {
            id: n.doc_id,
            score: n.score,
        })
        .collect()
}
