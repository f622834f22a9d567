//! Shared fixtures for unit tests.

use std::fs;
use std::path::Path;

use crate::catalog::{DatasetMeta, ShardCatalog, ShardDescriptor};
use crate::layout::DatasetLayout;

/// Write a corpus whose global row `i` is filled with the value `i`, split
/// into shards of the given row counts, and return its catalog.
pub(crate) fn write_sequential_corpus(dir: &Path, shard_rows: &[u64], dim: usize) -> ShardCatalog {
    let layout = DatasetLayout::default();
    let label = "test";
    let mut shards = Vec::new();
    let mut start = 0u64;
    for (index, &count) in shard_rows.iter().enumerate() {
        let path = layout.shard_path(dir, label, index);
        let mut bytes = Vec::with_capacity(count as usize * dim * 4);
        for row in start..start + count {
            for _ in 0..dim {
                bytes.extend_from_slice(&(row as f32).to_le_bytes());
            }
        }
        fs::write(&path, bytes).unwrap();
        shards.push(ShardDescriptor { path, start, count });
        start += count;
    }
    let mut meta = DatasetMeta::new(dim);
    meta.count = Some(start);
    fs::write(
        layout.meta_path(dir, label),
        serde_json::to_string(&meta).unwrap(),
    )
    .unwrap();
    ShardCatalog::from_shards(label, dim, shards).unwrap()
}
