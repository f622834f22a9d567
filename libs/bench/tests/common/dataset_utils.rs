/// Shared dataset fixtures for shardbench integration tests
///
/// - Sequential corpora where every element of row `i` equals `i`, for
///   checking that streamed and materialised rows land at the right ids
/// - Random unit-vector corpora with a generated ground-truth sidecar, for
///   end-to-end benchmark runs
///
/// Used by every `test_*.rs` file in this directory.

use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use shardbench::{
    generate_ground_truth, DatasetLayout, GenerateOptions, GroundTruthConfig, ShardCatalog,
    ShardWriter, WriterOptions,
};

pub const LABEL: &str = "1K";

/// Write shards with the given row counts; row `i` is `[i as f32; dim]`.
#[allow(dead_code)]
pub fn write_sequential(dir: &Path, shard_rows: &[u64], dim: usize) -> ShardCatalog {
    // shard sizes may differ, so files are written directly
    let layout = DatasetLayout::default();
    let mut shards = Vec::new();
    let mut start = 0u64;
    for (index, &count) in shard_rows.iter().enumerate() {
        let path = layout.shard_path(dir, LABEL, index);
        let mut bytes = Vec::with_capacity(count as usize * dim * 4);
        for row in start..start + count {
            for _ in 0..dim {
                bytes.extend_from_slice(&(row as f32).to_le_bytes());
            }
        }
        std::fs::write(&path, bytes).unwrap();
        shards.push(shardbench::ShardDescriptor { path, start, count });
        start += count;
    }
    let meta = serde_json::json!({ "dim": dim, "dtype": "float32", "count": start });
    std::fs::write(layout.meta_path(dir, LABEL), meta.to_string()).unwrap();
    ShardCatalog::from_shards(LABEL, dim, shards).unwrap()
}

/// Random rows, uniform in [-1, 1] per component, not normalised.
#[allow(dead_code)]
pub fn random_rows(rows: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..rows * dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

/// Write `data` (row-major, `dim` wide) as-is through a [`ShardWriter`].
#[allow(dead_code)]
pub fn write_rows(dir: &Path, data: &[f32], dim: usize, shard_size: u64) -> ShardCatalog {
    let options = WriterOptions::default().with_shard_size(shard_size);
    let mut writer = ShardWriter::create(dir, DatasetLayout::default(), LABEL, dim, options).unwrap();
    writer.write_rows(data).unwrap();
    writer.finish().unwrap()
}

/// Write unit-normalised random rows through a [`ShardWriter`].
#[allow(dead_code)]
pub fn write_random(dir: &Path, rows: usize, dim: usize, shard_size: u64, seed: u64) -> ShardCatalog {
    let options = WriterOptions::default()
        .with_shard_size(shard_size)
        .with_normalize(true);
    let mut writer = ShardWriter::create(dir, DatasetLayout::default(), LABEL, dim, options).unwrap();
    writer.write_rows(&random_rows(rows, dim, seed)).unwrap();
    writer.finish().unwrap()
}

/// Random corpus plus a ground-truth sidecar for `num_queries` sampled ids.
#[allow(dead_code)]
pub fn write_benchmark_dataset(dir: &Path, rows: usize, dim: usize, num_queries: usize, k: usize) -> ShardCatalog {
    let catalog = write_random(dir, rows, dim, (rows as u64 / 3).max(1), 7);
    let options = GenerateOptions::default()
        .with_num_queries(num_queries)
        .with_ground_truth(GroundTruthConfig::default().with_k(k).with_chunk_rows(64));
    generate_ground_truth(dir, &DatasetLayout::default(), &options).unwrap();
    catalog
}
