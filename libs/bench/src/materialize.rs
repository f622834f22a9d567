//! Fetch arbitrary corpus rows into a dense query matrix.

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::ShardCatalog;
use crate::error::{Error, Result};
use crate::mapping::{MapStats, ShardMap};

/// Dense row-major matrix of owned vectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatrix {
    pub dim: usize,
    pub data: Vec<f32>,
}

impl QueryMatrix {
    pub fn zeros(rows: usize, dim: usize) -> Self {
        Self {
            dim,
            data: vec![0.0; rows * dim],
        }
    }

    /// Build from individual rows; every row must have length `dim`.
    pub fn from_rows(dim: usize, rows: &[Vec<f32>]) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            if row.len() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { dim, data })
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    pub fn iter_rows(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dim.max(1))
    }
}

/// Copies requested rows out of the shards, mapping each shard at most once.
#[derive(Debug, Clone, Default)]
pub struct QueryMaterializer {
    stats: Arc<MapStats>,
}

impl QueryMaterializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(stats: Arc<MapStats>) -> Self {
        Self { stats }
    }

    pub fn map_stats(&self) -> &Arc<MapStats> {
        &self.stats
    }

    /// Output row `i` is corpus row `ids[i]`; duplicates are kept.
    ///
    /// All ids are range-checked before anything is mapped.
    pub fn materialize(&self, catalog: &ShardCatalog, ids: &[u64]) -> Result<QueryMatrix> {
        catalog.check_rows(ids)?;
        let dim = catalog.dim;
        let mut out = QueryMatrix::zeros(ids.len(), dim);

        // (shard, local row, output position), grouped by shard.
        let mut wanted: Vec<(usize, u64, usize)> = Vec::with_capacity(ids.len());
        for (pos, &id) in ids.iter().enumerate() {
            let (shard_idx, local) = catalog
                .locate(id)
                .ok_or(Error::QueryOutOfRange {
                    id,
                    total_rows: catalog.total_rows(),
                })?;
            wanted.push((shard_idx, local, pos));
        }
        wanted.sort_unstable();

        for group in wanted.chunk_by(|a, b| a.0 == b.0) {
            let shard = &catalog.shards()[group[0].0];
            let map = ShardMap::open(shard, dim, &self.stats)?;
            for &(_, local, pos) in group {
                out.data[pos * dim..(pos + 1) * dim].copy_from_slice(map.row(local)?);
            }
            tracing::debug!(
                shard = %shard.path.display(),
                rows = group.len(),
                "materialized query rows"
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_sequential_corpus;
    use tempfile::TempDir;

    #[test]
    fn test_order_duplicates_and_single_map_per_shard() {
        let dir = TempDir::new().unwrap();
        let catalog = write_sequential_corpus(dir.path(), &[4, 4, 4], 2);
        let materializer = QueryMaterializer::new();
        let matrix = materializer.materialize(&catalog, &[9, 1, 9, 2, 0]).unwrap();
        assert_eq!(matrix.len(), 5);
        let firsts: Vec<f32> = matrix.iter_rows().map(|r| r[0]).collect();
        assert_eq!(firsts, vec![9.0, 1.0, 9.0, 2.0, 0.0]);
        // shards 0 and 2 only
        assert_eq!(materializer.map_stats().total_opened(), 2);
        assert_eq!(materializer.map_stats().peak_open(), 1);
    }

    #[test]
    fn test_out_of_range_before_any_mapping() {
        let dir = TempDir::new().unwrap();
        let catalog = write_sequential_corpus(dir.path(), &[4], 2);
        let materializer = QueryMaterializer::new();
        let err = materializer.materialize(&catalog, &[0, 4]).unwrap_err();
        assert!(matches!(err, Error::QueryOutOfRange { id: 4, total_rows: 4 }));
        assert_eq!(materializer.map_stats().total_opened(), 0);
    }

    #[test]
    fn test_empty_ids() {
        let dir = TempDir::new().unwrap();
        let catalog = write_sequential_corpus(dir.path(), &[4], 2);
        let matrix = QueryMaterializer::new().materialize(&catalog, &[]).unwrap();
        assert!(matrix.is_empty());
    }

    #[test]
    fn test_from_rows() {
        let m = QueryMatrix::from_rows(2, &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.row(1), &[3.0, 4.0]);
        assert!(matches!(
            QueryMatrix::from_rows(2, &[vec![1.0]]),
            Err(Error::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }
}
