//! Reproducible synthetic corpora.

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::ShardCatalog;
use crate::error::Result;
use crate::layout::DatasetLayout;
use crate::writer::{ShardWriter, WriterOptions};

/// Shape of a generated dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    pub rows: u64,
    pub dim: usize,
    pub seed: u64,
    pub shard_size: u64,
    /// Rows generated per call into the writer.
    pub batch_size: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            rows: 10_000,
            dim: 128,
            seed: 42,
            shard_size: 2_500,
            batch_size: 1_000,
        }
    }
}

impl SyntheticConfig {
    pub fn new(rows: u64, dim: usize) -> Self {
        Self {
            rows,
            dim,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_shard_size(mut self, shard_size: u64) -> Self {
        self.shard_size = shard_size;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Streaming generator of unit vectors.
///
/// Components are uniform in `[-1, 1]` before normalisation; the same seed
/// always yields the same rows.
pub struct SyntheticCorpus {
    rng: ChaCha8Rng,
    dim: usize,
    generated: u64,
    total: u64,
}

impl SyntheticCorpus {
    pub fn new(dim: usize, total: u64, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            dim,
            generated: 0,
            total,
        }
    }

    /// Next batch as a flat row-major buffer, `None` when exhausted.
    pub fn next_batch(&mut self, batch_size: usize) -> Option<Vec<f32>> {
        if self.generated >= self.total {
            return None;
        }
        let count = (batch_size.max(1) as u64).min(self.total - self.generated) as usize;
        let mut batch = Vec::with_capacity(count * self.dim);
        for _ in 0..count {
            let start = batch.len();
            batch.extend((0..self.dim).map(|_| {
                let r: f32 = self.rng.gen();
                r * 2.0 - 1.0
            }));
            shardbench_core::distance::normalize(&mut batch[start..]);
        }
        self.generated += count as u64;
        Some(batch)
    }

    /// Generate `config.rows` rows into `dir` under `label`.
    pub fn write_dataset(
        dir: &Path,
        layout: &DatasetLayout,
        label: &str,
        config: &SyntheticConfig,
    ) -> Result<ShardCatalog> {
        let mut generator = Self::new(config.dim, config.rows, config.seed);
        let mut writer = ShardWriter::create(
            dir,
            layout.clone(),
            label,
            config.dim,
            WriterOptions::default().with_shard_size(config.shard_size),
        )?;
        while let Some(batch) = generator.next_batch(config.batch_size) {
            writer.write_rows(&batch)?;
        }
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unit_norm_and_reproducible() {
        let mut a = SyntheticCorpus::new(8, 10, 3);
        let mut b = SyntheticCorpus::new(8, 10, 3);
        let batch_a = a.next_batch(10).unwrap();
        assert_eq!(batch_a, b.next_batch(10).unwrap());
        for row in batch_a.chunks_exact(8) {
            let n = shardbench_core::distance::norm(row);
            assert!((n - 1.0).abs() < 1e-5);
        }
        assert!(a.next_batch(10).is_none());
    }

    #[test]
    fn test_write_dataset() {
        let dir = TempDir::new().unwrap();
        let config = SyntheticConfig::new(25, 4).with_shard_size(10).with_batch_size(7);
        let catalog = SyntheticCorpus::write_dataset(dir.path(), &DatasetLayout::default(), "25", &config).unwrap();
        assert_eq!(catalog.total_rows(), 25);
        assert_eq!(catalog.num_shards(), 3);
    }
}
