//! Benchmark run configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::{IndexParams, SearchParams};
use crate::error::{Error, Result};
use crate::ground_truth::{DEFAULT_GT_K, DEFAULT_NUM_QUERIES, DEFAULT_SEED};
use crate::layout::DatasetLayout;
use crate::metric::Metric;
use crate::stream::DEFAULT_BATCH_SIZE;

pub const DEFAULT_DB_ROOT: &str = "shardbench_runs";

/// Everything one benchmark run needs besides the dataset files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub dataset_dir: PathBuf,
    pub layout: DatasetLayout,
    /// Backend name, see [`crate::backend::backend_by_name`].
    pub backend: String,
    pub metric: Metric,
    /// Recall is measured at this depth.
    pub k: usize,
    /// Queries taken from the head of the ground-truth file.
    pub num_queries: usize,
    /// Explicit query ids; overrides `num_queries`.
    pub query_ids: Option<Vec<u64>>,
    /// Rows per insert batch.
    pub batch_size: usize,
    /// Rows to ingest; defaults to the whole corpus.
    pub count: Option<u64>,
    pub index: IndexParams,
    pub search: SearchParams,
    pub seed: u64,
    /// Parent directory of per-run directories.
    pub db_root: PathBuf,
    /// Keep the store after a successful run.
    pub keep_db: bool,
}

impl BenchmarkConfig {
    pub fn new(dataset_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset_dir: dataset_dir.into(),
            layout: DatasetLayout::default(),
            backend: "ivf".to_string(),
            metric: Metric::Cosine,
            k: DEFAULT_GT_K,
            num_queries: DEFAULT_NUM_QUERIES,
            query_ids: None,
            batch_size: DEFAULT_BATCH_SIZE,
            count: None,
            index: IndexParams::default(),
            search: SearchParams::default(),
            seed: DEFAULT_SEED,
            db_root: PathBuf::from(DEFAULT_DB_ROOT),
            keep_db: false,
        }
    }

    pub fn with_layout(mut self, layout: DatasetLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_num_queries(mut self, n: usize) -> Self {
        self.num_queries = n;
        self
    }

    pub fn with_query_ids(mut self, ids: Option<Vec<u64>>) -> Self {
        self.query_ids = ids;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_count(mut self, count: Option<u64>) -> Self {
        self.count = count;
        self
    }

    pub fn with_index(mut self, index: IndexParams) -> Self {
        self.index = index;
        self
    }

    pub fn with_search(mut self, search: SearchParams) -> Self {
        self.search = search;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_db_root(mut self, db_root: impl Into<PathBuf>) -> Self {
        self.db_root = db_root.into();
        self
    }

    pub fn with_keep_db(mut self, keep: bool) -> Self {
        self.keep_db = keep;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::InvalidArgument("k must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidArgument("batch_size must be positive".into()));
        }
        if self.num_queries == 0 && self.query_ids.as_ref().map_or(true, Vec::is_empty) {
            return Err(Error::InvalidArgument("no queries requested".into()));
        }
        if self.search.nprobe == 0 {
            return Err(Error::InvalidArgument("nprobe must be positive".into()));
        }
        Ok(())
    }

    /// Deterministic per-run directory name built from the sweep parameters.
    pub fn run_dir_name(&self, label: &str) -> String {
        let dataset = dir_name(&self.dataset_dir);
        [
            format!("dataset={}", dataset),
            format!("label={}", label),
            format!("backend={}", self.backend.to_lowercase()),
            format!("metric={}", self.metric),
            format!("nlist={}", self.index.nlist),
            format!("nprobe={}", self.search.nprobe),
            format!("batch={}", self.batch_size),
            format!("seed={}", self.seed),
        ]
        .join("_")
    }

    pub fn run_dir(&self, label: &str) -> PathBuf {
        self.db_root.join(self.run_dir_name(label))
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}
