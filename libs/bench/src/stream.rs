//! Bounded-memory streaming over a shard catalog.
//!
//! [`CorpusStream`] yields batches of rows in strictly increasing global
//! order. Each batch is a zero-copy view into the one shard map that is
//! currently open; the map is released before the next shard is mapped, so
//! resident memory stays proportional to the batch size and not to the
//! corpus.
//!
//! ```ignore
//! let mut stream = CorpusStream::new(&catalog, StreamOptions::default())?;
//! while let Some(batch) = stream.next_batch()? {
//!     store.insert_batch(batch.global_start, batch.rows)?;
//! }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::ShardCatalog;
use crate::error::{Error, Result};
use crate::mapping::{MapStats, ShardMap};

/// Default rows per batch, matching the ingest batch of the MSMARCO runs.
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

/// Where a stream starts, how far it goes and how big each batch is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    pub batch_size: usize,
    /// First global row to yield.
    pub start_offset: u64,
    /// Upper bound on rows yielded over the whole stream.
    pub max_rows: Option<u64>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            start_offset: 0,
            max_rows: None,
        }
    }
}

impl StreamOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_start_offset(mut self, offset: u64) -> Self {
        self.start_offset = offset;
        self
    }

    pub fn with_max_rows(mut self, max_rows: Option<u64>) -> Self {
        self.max_rows = max_rows;
        self
    }
}

/// A run of consecutive rows from a single shard.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    /// Global index of the first row.
    pub global_start: u64,
    /// `len() * dim` values, row-major.
    pub rows: &'a [f32],
    pub dim: usize,
}

impl<'a> Batch<'a> {
    pub fn len(&self) -> usize {
        self.rows.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One past the last global row.
    pub fn global_end(&self) -> u64 {
        self.global_start + self.len() as u64
    }

    pub fn row(&self, i: usize) -> &'a [f32] {
        &self.rows[i * self.dim..(i + 1) * self.dim]
    }

    /// `(global_row, values)` pairs.
    pub fn iter_rows(&self) -> impl Iterator<Item = (u64, &'a [f32])> + 'a {
        let start = self.global_start;
        self.rows
            .chunks_exact(self.dim)
            .enumerate()
            .map(move |(i, row)| (start + i as u64, row))
    }
}

/// Lending stream of [`Batch`]es over a catalog.
///
/// Holds at most one shard map at a time. Creating a new stream with the same
/// catalog and options replays the same sequence.
pub struct CorpusStream<'a> {
    catalog: &'a ShardCatalog,
    batch_size: usize,
    shard_idx: usize,
    /// Next local row in `shards[shard_idx]`.
    local: u64,
    remaining: u64,
    current: Option<ShardMap>,
    stats: Arc<MapStats>,
}

impl<'a> CorpusStream<'a> {
    pub fn new(catalog: &'a ShardCatalog, options: StreamOptions) -> Result<Self> {
        Self::with_stats(catalog, options, MapStats::new())
    }

    /// Like [`CorpusStream::new`], recording map activity into `stats`.
    pub fn with_stats(catalog: &'a ShardCatalog, options: StreamOptions, stats: Arc<MapStats>) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(Error::InvalidArgument("batch_size must be positive".into()));
        }

        // Whole shards before the offset are skipped by count alone; only the
        // shard containing the offset gets a row-level skip once mapped.
        let (shard_idx, local) = match catalog.locate(options.start_offset) {
            Some(position) => position,
            None => (catalog.num_shards(), 0),
        };
        let available = catalog.total_rows().saturating_sub(options.start_offset);
        let remaining = options.max_rows.map_or(available, |m| m.min(available));

        Ok(Self {
            catalog,
            batch_size: options.batch_size,
            shard_idx,
            local,
            remaining,
            current: None,
            stats,
        })
    }

    /// Rows still to be yielded.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn map_stats(&self) -> &Arc<MapStats> {
        &self.stats
    }

    /// Next batch, or `None` once the bound or the corpus end is reached.
    ///
    /// A batch never spans two shards; it is cut short at a shard boundary.
    pub fn next_batch(&mut self) -> Result<Option<Batch<'_>>> {
        let catalog: &'a ShardCatalog = self.catalog;
        let shards = catalog.shards();
        loop {
            if self.remaining == 0 {
                self.current = None;
                return Ok(None);
            }
            let Some(shard) = shards.get(self.shard_idx) else {
                self.current = None;
                return Ok(None);
            };
            if self.local >= shard.count {
                // Release before mapping the next shard.
                self.current = None;
                self.shard_idx += 1;
                self.local = 0;
                continue;
            }
            if self.current.is_none() {
                self.current = Some(ShardMap::open(shard, catalog.dim, &self.stats)?);
            }
            break;
        }

        let shard = &shards[self.shard_idx];
        let take = (shard.count - self.local)
            .min(self.batch_size as u64)
            .min(self.remaining);
        let from = self.local;
        self.local += take;
        self.remaining -= take;

        let map = match self.current.as_ref() {
            Some(map) => map,
            None => return Ok(None),
        };
        let rows = map.rows(from..from + take)?;
        Ok(Some(Batch {
            global_start: shard.start + from,
            rows,
            dim: catalog.dim,
        }))
    }

    /// Drive the stream to completion, returning the number of rows seen.
    pub fn for_each_batch<F>(mut self, mut f: F) -> Result<u64>
    where
        F: FnMut(Batch<'_>) -> Result<()>,
    {
        let mut rows = 0u64;
        while let Some(batch) = self.next_batch()? {
            rows += batch.len() as u64;
            f(batch)?;
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_sequential_corpus;
    use tempfile::TempDir;

    fn collect(catalog: &ShardCatalog, options: StreamOptions) -> Vec<(u64, usize)> {
        let mut out = Vec::new();
        CorpusStream::new(catalog, options)
            .unwrap()
            .for_each_batch(|b| {
                out.push((b.global_start, b.len()));
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn test_batches_never_span_shards() {
        let dir = TempDir::new().unwrap();
        let catalog = write_sequential_corpus(dir.path(), &[5, 3], 2);
        let batches = collect(&catalog, StreamOptions::default().with_batch_size(4));
        assert_eq!(batches, vec![(0, 4), (4, 1), (5, 3)]);
    }

    #[test]
    fn test_start_offset_and_max_rows() {
        let dir = TempDir::new().unwrap();
        let catalog = write_sequential_corpus(dir.path(), &[5, 0, 5], 1);
        let options = StreamOptions::default()
            .with_batch_size(10)
            .with_start_offset(3)
            .with_max_rows(Some(4));
        assert_eq!(collect(&catalog, options), vec![(3, 2), (5, 2)]);

        let mut stream = CorpusStream::new(&catalog, StreamOptions::default().with_start_offset(7)).unwrap();
        let batch = stream.next_batch().unwrap().unwrap();
        assert_eq!(batch.global_start, 7);
        assert_eq!(batch.rows, &[7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_empty_streams() {
        let dir = TempDir::new().unwrap();
        let catalog = write_sequential_corpus(dir.path(), &[4], 2);
        assert!(collect(&catalog, StreamOptions::default().with_start_offset(4)).is_empty());
        assert!(collect(&catalog, StreamOptions::default().with_max_rows(Some(0))).is_empty());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let dir = TempDir::new().unwrap();
        let catalog = write_sequential_corpus(dir.path(), &[4], 2);
        let result = CorpusStream::new(&catalog, StreamOptions::default().with_batch_size(0));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_one_map_at_a_time_and_released_at_end() {
        let dir = TempDir::new().unwrap();
        let catalog = write_sequential_corpus(dir.path(), &[3, 3, 3, 3], 2);
        let stats = MapStats::new();
        let mut stream =
            CorpusStream::with_stats(&catalog, StreamOptions::default().with_batch_size(2), Arc::clone(&stats)).unwrap();
        while let Some(batch) = stream.next_batch().unwrap() {
            assert!(!batch.is_empty());
            assert_eq!(stats.open(), 1);
        }
        assert_eq!(stats.open(), 0);
        assert_eq!(stats.peak_open(), 1);
        assert_eq!(stats.total_opened(), 4);
    }

    #[test]
    fn test_iter_rows_global_ids() {
        let dir = TempDir::new().unwrap();
        let catalog = write_sequential_corpus(dir.path(), &[2, 2], 3);
        let mut ids = Vec::new();
        CorpusStream::new(&catalog, StreamOptions::default())
            .unwrap()
            .for_each_batch(|b| {
                for (id, row) in b.iter_rows() {
                    assert_eq!(row, &[id as f32; 3]);
                    ids.push(id);
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}
