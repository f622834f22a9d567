//! Exact brute-force ground truth.
//!
//! [`GroundTruthEngine::compute`] streams the corpus once, scores every
//! streamed chunk against the whole query matrix in one batched call and
//! feeds one [`BoundedTopK`] per query. The cost is one sequential pass over
//! the shards regardless of the number of queries.
//!
//! Ground truth is persisted as JSON lines:
//!
//! ```text
//! {"query_id":17,"topk":[{"doc_id":17,"score":1.0},{"doc_id":90211,"score":0.83}, ...]}
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::ShardCatalog;
use crate::error::{Error, Result};
use crate::layout::DatasetLayout;
use crate::mapping::MapStats;
use crate::materialize::{QueryMaterializer, QueryMatrix};
use crate::metric::{Metric, PreparedQueries};
use crate::stream::{CorpusStream, StreamOptions};
use crate::topk::{BoundedTopK, Neighbor};

/// Ground-truth depth used by the MSMARCO runs.
pub const DEFAULT_GT_K: usize = 50;
/// Rows scored per batched similarity call.
pub const DEFAULT_CHUNK_ROWS: usize = 4096;
/// Queries sampled per dataset.
pub const DEFAULT_NUM_QUERIES: usize = 1000;
pub const DEFAULT_SEED: u64 = 42;

/// Parameters of one ground-truth pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthConfig {
    pub k: usize,
    pub metric: Metric,
    /// Chunk size of the corpus stream. Larger chunks widen the batched
    /// scoring at the cost of a `chunk_rows * num_queries` score buffer.
    pub chunk_rows: usize,
    /// Log progress every this many rows; `None` logs per shard only.
    pub progress_every_rows: Option<u64>,
}

impl Default for GroundTruthConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_GT_K,
            metric: Metric::Cosine,
            chunk_rows: DEFAULT_CHUNK_ROWS,
            progress_every_rows: None,
        }
    }
}

impl GroundTruthConfig {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_chunk_rows(mut self, chunk_rows: usize) -> Self {
        self.chunk_rows = chunk_rows;
        self
    }

    pub fn with_progress_every_rows(mut self, rows: Option<u64>) -> Self {
        self.progress_every_rows = rows;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::InvalidArgument("ground truth k must be positive".into()));
        }
        if self.chunk_rows == 0 {
            return Err(Error::InvalidArgument("chunk_rows must be positive".into()));
        }
        Ok(())
    }
}

/// Answer key of one query, best-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthEntry {
    pub query_id: u64,
    pub topk: Vec<Neighbor>,
}

impl GroundTruthEntry {
    pub fn doc_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.topk.iter().map(|n| n.doc_id)
    }
}

/// Single-pass exact top-k over a catalog.
#[derive(Debug, Clone)]
pub struct GroundTruthEngine {
    config: GroundTruthConfig,
    stats: Arc<MapStats>,
}

impl GroundTruthEngine {
    pub fn new(config: GroundTruthConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stats: MapStats::new(),
        })
    }

    pub fn with_stats(mut self, stats: Arc<MapStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn config(&self) -> &GroundTruthConfig {
        &self.config
    }

    pub fn map_stats(&self) -> &Arc<MapStats> {
        &self.stats
    }

    /// One entry per query row, in input order. `query_ids[i]` labels row `i`
    /// of `queries`.
    pub fn compute(
        &self,
        catalog: &ShardCatalog,
        queries: &QueryMatrix,
        query_ids: &[u64],
    ) -> Result<Vec<GroundTruthEntry>> {
        if queries.dim != catalog.dim {
            return Err(Error::DimensionMismatch {
                expected: catalog.dim,
                actual: queries.dim,
            });
        }
        if query_ids.len() != queries.len() {
            return Err(Error::InvalidArgument(format!(
                "{} query ids for {} query rows",
                query_ids.len(),
                queries.len()
            )));
        }

        let num_queries = queries.len();
        let prepared = PreparedQueries::new(self.config.metric, &queries.data, queries.dim);
        let mut heaps: Vec<BoundedTopK> = (0..num_queries).map(|_| BoundedTopK::new(self.config.k)).collect();
        let mut scores = Vec::with_capacity(self.config.chunk_rows * num_queries);

        tracing::info!(
            queries = num_queries,
            k = self.config.k,
            metric = %self.config.metric,
            rows = catalog.total_rows(),
            shards = catalog.num_shards(),
            "[GT] building exact ground truth"
        );
        let start = Instant::now();
        let mut next_progress = self.config.progress_every_rows;

        let options = StreamOptions::default().with_batch_size(self.config.chunk_rows);
        let stream = CorpusStream::with_stats(catalog, options, Arc::clone(&self.stats))?;
        let scanned = stream.for_each_batch(|batch| {
            if let Some((shard_idx, 0)) = catalog.locate(batch.global_start) {
                tracing::info!(
                    shard = %catalog.shards()[shard_idx].path.display(),
                    "[GT] scanning shard {}/{}",
                    shard_idx + 1,
                    catalog.num_shards()
                );
            }

            prepared.score_block(batch.rows, &mut scores);
            if num_queries > 0 {
                for (r, row_scores) in scores.chunks_exact(num_queries).enumerate() {
                    let doc_id = batch.global_start + r as u64;
                    for (heap, &score) in heaps.iter_mut().zip(row_scores) {
                        heap.offer(doc_id, score);
                    }
                }
            }

            if let (Some(every), Some(at)) = (self.config.progress_every_rows, next_progress) {
                if batch.global_end() >= at {
                    tracing::info!(
                        rows = batch.global_end(),
                        total = catalog.total_rows(),
                        elapsed_sec = start.elapsed().as_secs_f64(),
                        "[GT] progress"
                    );
                    next_progress = Some(at + every.max(1));
                }
            }
            Ok(())
        })?;

        tracing::info!(
            rows = scanned,
            elapsed_sec = start.elapsed().as_secs_f64(),
            "[GT] scan complete"
        );

        Ok(query_ids
            .iter()
            .zip(heaps)
            .map(|(&query_id, heap)| GroundTruthEntry {
                query_id,
                topk: heap.into_sorted(),
            })
            .collect())
    }
}

/// Parsed ground-truth file, in file order.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    query_ids: Vec<u64>,
    answers: HashMap<u64, Vec<Neighbor>>,
}

impl GroundTruth {
    pub fn from_entries(entries: impl IntoIterator<Item = GroundTruthEntry>) -> Self {
        let mut truth = Self::default();
        for entry in entries {
            truth.insert(entry);
        }
        truth
    }

    fn insert(&mut self, entry: GroundTruthEntry) -> bool {
        match self.answers.entry(entry.query_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                self.query_ids.push(entry.query_id);
                slot.insert(entry.topk);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.query_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.query_ids.is_empty()
    }

    /// Query ids in file order.
    pub fn query_ids(&self) -> &[u64] {
        &self.query_ids
    }

    pub fn get(&self, query_id: u64) -> Option<&[Neighbor]> {
        self.answers.get(&query_id).map(Vec::as_slice)
    }

    /// Best `k` doc ids for a query.
    pub fn top_ids(&self, query_id: u64, k: usize) -> Option<Vec<u64>> {
        self.get(query_id)
            .map(|topk| topk.iter().take(k).map(|n| n.doc_id).collect())
    }

    /// Depth of the shallowest answer list.
    pub fn min_depth(&self) -> usize {
        self.answers.values().map(Vec::len).min().unwrap_or(0)
    }
}

/// Reading and writing `.gt.jsonl` files.
pub struct GroundTruthFile;

impl GroundTruthFile {
    /// Write `entries` to `path` via a sibling temp file, fsync, rename.
    ///
    /// A crash leaves either the previous file or the complete new one.
    pub fn write_atomic(path: &Path, entries: &[GroundTruthEntry]) -> Result<()> {
        let tmp = temp_sibling(path);
        let result = (|| -> Result<()> {
            let file = File::create(&tmp).map_err(|e| Error::io(&tmp, e))?;
            let mut writer = BufWriter::new(file);
            for entry in entries {
                serde_json::to_writer(&mut writer, entry)?;
                writer.write_all(b"\n").map_err(|e| Error::io(&tmp, e))?;
            }
            let file = writer
                .into_inner()
                .map_err(|e| Error::io(&tmp, e.into_error()))?;
            file.sync_all().map_err(|e| Error::io(&tmp, e))?;
            fs::rename(&tmp, path).map_err(|e| Error::io(path, e))
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    pub fn read(path: &Path) -> Result<GroundTruth> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let mut truth = GroundTruth::default();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| Error::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: GroundTruthEntry = serde_json::from_str(&line).map_err(|e| Error::InvalidGroundTruth {
                path: path.to_path_buf(),
                line: n + 1,
                reason: e.to_string(),
            })?;
            let query_id = entry.query_id;
            if !truth.insert(entry) {
                tracing::warn!(query_id, line = n + 1, "duplicate ground-truth query; keeping the first");
            }
        }
        Ok(truth)
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// `count` distinct ids in `[0, total_rows)`, reproducible for a seed.
pub fn sample_query_ids(total_rows: u64, count: usize, seed: u64) -> Vec<u64> {
    let count = count.min(total_rows as usize);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rand::seq::index::sample(&mut rng, total_rows as usize, count)
        .into_iter()
        .map(|i| i as u64)
        .collect()
}

/// Options of the standalone ground-truth generation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub num_queries: usize,
    pub seed: u64,
    /// Use these ids instead of sampling.
    pub query_ids: Option<Vec<u64>>,
    pub ground_truth: GroundTruthConfig,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            num_queries: DEFAULT_NUM_QUERIES,
            seed: DEFAULT_SEED,
            query_ids: None,
            ground_truth: GroundTruthConfig::default(),
        }
    }
}

impl GenerateOptions {
    pub fn with_num_queries(mut self, n: usize) -> Self {
        self.num_queries = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_query_ids(mut self, ids: Option<Vec<u64>>) -> Self {
        self.query_ids = ids;
        self
    }

    pub fn with_ground_truth(mut self, config: GroundTruthConfig) -> Self {
        self.ground_truth = config;
        self
    }
}

/// What a generation pass produced.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedGroundTruth {
    pub path: PathBuf,
    pub label: String,
    pub num_queries: usize,
    pub rows_scanned: u64,
    pub elapsed_sec: f64,
}

/// Scan `dir`, pick queries, compute their exact top-k and write the
/// dataset's `.gt.jsonl` atomically.
pub fn generate_ground_truth(
    dir: &Path,
    layout: &DatasetLayout,
    options: &GenerateOptions,
) -> Result<GeneratedGroundTruth> {
    let engine = GroundTruthEngine::new(options.ground_truth.clone())?;
    let start = Instant::now();
    let (catalog, _meta) = ShardCatalog::scan(dir, layout)?;

    let ids = match &options.query_ids {
        Some(ids) => ids.clone(),
        None => sample_query_ids(catalog.total_rows(), options.num_queries, options.seed),
    };
    let queries = QueryMaterializer::with_stats(Arc::clone(engine.map_stats())).materialize(&catalog, &ids)?;
    let entries = engine.compute(&catalog, &queries, &ids)?;

    let path = layout.ground_truth_path(dir, &catalog.label);
    GroundTruthFile::write_atomic(&path, &entries)?;
    tracing::info!(path = %path.display(), queries = entries.len(), "[GT] wrote ground truth");

    Ok(GeneratedGroundTruth {
        path,
        label: catalog.label.clone(),
        num_queries: entries.len(),
        rows_scanned: catalog.total_rows(),
        elapsed_sec: start.elapsed().as_secs_f64(),
    })
}
