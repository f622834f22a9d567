//! Phase-timed benchmark of one index backend against one dataset.
//!
//! ```text
//! load_queries -> create_db -> ingest_initial -> ingest_remaining
//!   -> create_index -> build_index_now -> warmup -> search -> close_db
//!   -> open_db -> warmup_after_reopen -> search_after_reopen -> close_db_final
//! ```
//!
//! Every phase is timed and RSS-sampled through a [`PhaseClock`]. A failure in
//! any phase other than a per-query search aborts the remaining phases; the
//! store is still closed (errors from that close are logged and dropped) and
//! a results document carrying the error is written.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use serde_json::Value;

use crate::backend::{backend_by_name, IndexBackend, SearchParams, VectorStore};
use crate::catalog::{ResolvedDataset, ShardCatalog};
use crate::config::BenchmarkConfig;
use crate::error::{Error, Result};
use crate::ground_truth::{GroundTruth, GroundTruthFile};
use crate::mapping::MapStats;
use crate::materialize::{QueryMaterializer, QueryMatrix};
use crate::metrics::{recall_at_k, LatencyStats};
use crate::phase::{PhaseClock, PhaseDetails};
use crate::report::{dir_size_mb, DatasetInfo, ResultsDocument};
use crate::rss::{ProcRss, RssSampler};
use crate::stream::{CorpusStream, StreamOptions};

/// Subdirectory of the run directory holding the store.
pub const DB_DIR: &str = "db";

/// Outcome of a search phase.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub queries: usize,
    /// Mean recall over scored queries; `None` if none were scored.
    pub recall_mean: Option<f64>,
    pub recall_count: usize,
    pub failed_queries: usize,
    pub latency: LatencyStats,
}

impl SearchStats {
    fn record_into(&self, details: &mut PhaseDetails) {
        details.insert("queries", self.queries as u64);
        details.insert("recall_mean", self.recall_mean);
        details.insert("recall_count", self.recall_count as u64);
        details.insert("failed_queries", self.failed_queries as u64);
        let has_latency = self.latency.count > 0;
        details.insert("latency_ms_mean", has_latency.then_some(self.latency.mean_ms));
        details.insert("latency_ms_p95", has_latency.then_some(self.latency.p95_ms));
        if has_latency {
            tracing::info!(
                queries = self.queries,
                failed = self.failed_queries,
                recall = ?self.recall_mean,
                "[search] {}",
                self.latency.summary()
            );
        }
    }
}

/// Query sample the search phases run, with its answer key.
struct QuerySet {
    ids: Vec<u64>,
    truth: Vec<Vec<u64>>,
    vectors: QueryMatrix,
}

/// Where a run left its artifacts.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub document: ResultsDocument,
    pub run_dir: PathBuf,
    pub results_json: PathBuf,
    pub results_md: PathBuf,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.document.succeeded()
    }
}

/// A configured benchmark.
pub struct BenchmarkRun {
    config: BenchmarkConfig,
    backend: Box<dyn IndexBackend>,
    sampler: Box<dyn RssSampler>,
    map_stats: Arc<MapStats>,
}

impl BenchmarkRun {
    /// Validate `config` and look up its backend by name.
    pub fn new(config: BenchmarkConfig) -> Result<Self> {
        config.validate()?;
        let backend = backend_by_name(&config.backend)?;
        Ok(Self {
            config,
            backend,
            sampler: Box::new(ProcRss),
            map_stats: MapStats::new(),
        })
    }

    /// Use a backend instance instead of the configured name.
    pub fn with_backend(mut self, backend: Box<dyn IndexBackend>) -> Self {
        self.config.backend = backend.name().to_string();
        self.backend = backend;
        self
    }

    pub fn with_sampler(mut self, sampler: Box<dyn RssSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Shard maps opened by this run's readers.
    pub fn map_stats(&self) -> &Arc<MapStats> {
        &self.map_stats
    }

    /// Execute every phase and write the results document.
    ///
    /// Dataset and ground-truth resolution failures are returned as errors
    /// before anything is written. Once the run directory exists, failures
    /// are reported through [`ResultsDocument::error`] and the partial
    /// document is still written.
    pub fn run(&self) -> Result<RunReport> {
        let ResolvedDataset {
            catalog,
            ground_truth_path,
            ..
        } = ShardCatalog::resolve(&self.config.dataset_dir, &self.config.layout)?;
        let truth = GroundTruthFile::read(&ground_truth_path)?;
        let ids = self.select_queries(&catalog, &truth)?;

        let run_dir = self.config.run_dir(&catalog.label);
        let db_path = run_dir.join(DB_DIR);
        fs::create_dir_all(&run_dir).map_err(|e| Error::io(&run_dir, e))?;
        if db_path.exists() {
            fs::remove_dir_all(&db_path).map_err(|e| Error::io(&db_path, e))?;
        }
        tracing::info!(
            run_dir = %run_dir.display(),
            backend = self.backend.name(),
            label = %catalog.label,
            queries = ids.len(),
            "starting benchmark run"
        );

        let mut clock = PhaseClock::new(self.sampler.as_ref());
        let mut store: Option<Box<dyn VectorStore>> = None;
        let started = Instant::now();
        let mut error = self
            .execute(&mut clock, &catalog, &truth, &ids, &db_path, &mut store)
            .err()
            .map(|e| e.to_string());

        if let Some(open) = store.take() {
            let closed = clock.run("close_db_final", |_| open.close());
            match (closed, &error) {
                (Err(e), None) => error = Some(e.to_string()),
                (Err(e), Some(_)) => {
                    tracing::warn!(error = %e, "close after failure also failed");
                }
                (Ok(()), _) => {}
            }
        }
        if let Some(e) = &error {
            tracing::error!(error = %e, "benchmark run failed");
        }

        let db_size_mb = dir_size_mb(&db_path);
        let document = ResultsDocument::from_phases(
            DatasetInfo::from_catalog(&catalog),
            self.config_summary(&catalog, ids.len()),
            self.backend.name(),
            clock.records(),
            db_path.clone(),
            db_size_mb,
            error,
        );
        let (results_json, results_md) = document.write(&run_dir)?;
        tracing::info!(
            json = %results_json.display(),
            elapsed_sec = started.elapsed().as_secs_f64(),
            "wrote results"
        );

        if document.succeeded() && !self.config.keep_db && db_path.exists() {
            fs::remove_dir_all(&db_path).map_err(|e| Error::io(&db_path, e))?;
        }

        Ok(RunReport {
            document,
            run_dir,
            results_json,
            results_md,
        })
    }

    /// Explicit ids, else the head of the ground-truth file. Ids outside the
    /// corpus or without a ground-truth answer are dropped.
    fn select_queries(&self, catalog: &ShardCatalog, truth: &GroundTruth) -> Result<Vec<u64>> {
        let (candidates, limit): (Vec<u64>, usize) = match &self.config.query_ids {
            Some(ids) => (ids.clone(), ids.len()),
            None => (truth.query_ids().to_vec(), self.config.num_queries),
        };
        let requested = candidates.len().min(limit);
        let ids: Vec<u64> = candidates
            .into_iter()
            .filter(|&id| id < catalog.total_rows())
            .filter(|&id| truth.get(id).is_some_and(|topk| !topk.is_empty()))
            .take(limit)
            .collect();
        if ids.is_empty() {
            return Err(Error::InvalidArgument(
                "no valid query ids with ground truth found".into(),
            ));
        }
        if ids.len() < requested {
            tracing::warn!(
                kept = ids.len(),
                requested,
                "dropped query ids outside the corpus or without ground truth"
            );
        }
        if truth.min_depth() < self.config.k {
            tracing::warn!(
                depth = truth.min_depth(),
                k = self.config.k,
                "ground truth is shallower than k; recall cannot reach 1.0"
            );
        }
        Ok(ids)
    }

    fn ingest_count(&self, catalog: &ShardCatalog) -> u64 {
        let total = catalog.total_rows();
        match self.config.count {
            Some(count) if count > total => {
                tracing::warn!(count, total, "count exceeds corpus; ingesting the whole corpus");
                total
            }
            Some(count) => count,
            None => total,
        }
    }

    fn execute(
        &self,
        clock: &mut PhaseClock<'_>,
        catalog: &ShardCatalog,
        truth: &GroundTruth,
        ids: &[u64],
        db_path: &Path,
        store: &mut Option<Box<dyn VectorStore>>,
    ) -> Result<()> {
        let config = &self.config;

        let queries = clock.run("load_queries", |d| {
            let materializer = QueryMaterializer::with_stats(Arc::clone(&self.map_stats));
            let vectors = materializer.materialize(catalog, ids)?;
            d.insert("queries", ids.len() as u64);
            let answers = ids
                .iter()
                .map(|&id| truth.top_ids(id, config.k).unwrap_or_default())
                .collect();
            Ok(QuerySet {
                ids: ids.to_vec(),
                truth: answers,
                vectors,
            })
        })?;

        *store = Some(clock.run("create_db", |d| {
            d.insert("db_path", db_path.display().to_string());
            d.insert("backend", self.backend.name());
            self.backend.create(db_path, catalog.dim, config.metric)
        })?);

        let count = self.ingest_count(catalog);
        let first = count.min(config.batch_size as u64);
        clock.run("ingest_initial", |d| self.ingest(catalog, active(store)?, 0, first, d))?;
        if count > first {
            clock.run("ingest_remaining", |d| {
                self.ingest(catalog, active(store)?, first, count - first, d)
            })?;
        }

        clock.run("create_index", |d| {
            d.insert("nlist", config.index.nlist as u64);
            d.insert("train_sample", config.index.train_sample as u64);
            d.insert("train_iters", config.index.train_iters as u64);
            active(store)?.create_index(&config.index)
        })?;

        clock.run("build_index_now", |d| {
            let built = active(store)?.build_now()?;
            d.insert("built", built);
            Ok(())
        })?;

        clock.run("warmup", |d| warmup(active(store)?, &queries, config.k, &config.search, d))?;
        clock.run("search", |d| {
            let stats = search(active(store)?, &queries, config.k, &config.search);
            stats.record_into(d);
            Ok(())
        })?;

        clock.run("close_db", |_| match store.take() {
            Some(open) => open.close(),
            None => Ok(()),
        })?;

        *store = Some(clock.run("open_db", |_| self.backend.open(db_path))?);

        clock.run("warmup_after_reopen", |d| {
            warmup(active(store)?, &queries, config.k, &config.search, d)
        })?;
        clock.run("search_after_reopen", |d| {
            let stats = search(active(store)?, &queries, config.k, &config.search);
            stats.record_into(d);
            Ok(())
        })?;
        Ok(())
    }

    /// Stream `rows` rows starting at `offset` into the store.
    fn ingest(
        &self,
        catalog: &ShardCatalog,
        store: &mut dyn VectorStore,
        offset: u64,
        rows: u64,
        details: &mut PhaseDetails,
    ) -> Result<()> {
        let options = StreamOptions::default()
            .with_batch_size(self.config.batch_size)
            .with_start_offset(offset)
            .with_max_rows(Some(rows));
        let mut batches = 0u64;
        let stream = CorpusStream::with_stats(catalog, options, Arc::clone(&self.map_stats))?;
        let ingested = stream.for_each_batch(|batch| {
            batches += 1;
            store.insert_batch(batch.global_start, batch.rows)
        })?;
        details.insert("rows", ingested);
        details.insert("offset", offset);
        details.insert("batches", batches);
        Ok(())
    }

    fn config_summary(&self, catalog: &ShardCatalog, queries: usize) -> IndexMap<String, Value> {
        let c = &self.config;
        let mut map = IndexMap::new();
        map.insert("backend".to_string(), Value::from(self.backend.name()));
        map.insert("metric".to_string(), Value::from(c.metric.as_str()));
        map.insert("nlist".to_string(), Value::from(c.index.nlist as u64));
        map.insert("train_sample".to_string(), Value::from(c.index.train_sample as u64));
        map.insert("train_iters".to_string(), Value::from(c.index.train_iters as u64));
        map.insert("nprobe".to_string(), Value::from(c.search.nprobe as u64));
        map.insert("batch_size".to_string(), Value::from(c.batch_size as u64));
        map.insert("count".to_string(), Value::from(self.ingest_count(catalog)));
        map.insert("queries".to_string(), Value::from(queries as u64));
        map.insert("k".to_string(), Value::from(c.k as u64));
        map.insert("seed".to_string(), Value::from(c.seed));
        map
    }
}

/// Parameter grid for [`sweep`]. Empty axes keep the base config's value.
#[derive(Debug, Clone, Default)]
pub struct SweepGrid {
    pub backends: Vec<String>,
    pub nlists: Vec<usize>,
    pub nprobes: Vec<usize>,
    pub batch_sizes: Vec<usize>,
}

impl SweepGrid {
    pub fn with_backends(mut self, backends: Vec<String>) -> Self {
        self.backends = backends;
        self
    }

    pub fn with_nlists(mut self, nlists: Vec<usize>) -> Self {
        self.nlists = nlists;
        self
    }

    pub fn with_nprobes(mut self, nprobes: Vec<usize>) -> Self {
        self.nprobes = nprobes;
        self
    }

    pub fn with_batch_sizes(mut self, batch_sizes: Vec<usize>) -> Self {
        self.batch_sizes = batch_sizes;
        self
    }

    /// Every combination, backends outermost.
    pub fn configs(&self, base: &BenchmarkConfig) -> Vec<BenchmarkConfig> {
        fn axis<T: Clone>(values: &[T], fallback: T) -> Vec<T> {
            if values.is_empty() {
                vec![fallback]
            } else {
                values.to_vec()
            }
        }

        let mut configs = Vec::new();
        for backend in axis(&self.backends, base.backend.clone()) {
            for &nlist in &axis(&self.nlists, base.index.nlist) {
                for &nprobe in &axis(&self.nprobes, base.search.nprobe) {
                    for &batch_size in &axis(&self.batch_sizes, base.batch_size) {
                        configs.push(
                            base.clone()
                                .with_backend(backend.clone())
                                .with_index(base.index.clone().with_nlist(nlist))
                                .with_search(base.search.clone().with_nprobe(nprobe))
                                .with_batch_size(batch_size),
                        );
                    }
                }
            }
        }
        configs
    }
}

/// One sweep entry.
#[derive(Debug)]
pub struct SweepOutcome {
    pub config: BenchmarkConfig,
    pub result: Result<RunReport>,
}

/// Run one benchmark per grid combination.
///
/// A failing combination is recorded and the sweep moves on, except for
/// dataset or ground-truth resolution errors, which would fail every
/// combination and are returned immediately.
pub fn sweep(base: &BenchmarkConfig, grid: &SweepGrid) -> Result<Vec<SweepOutcome>> {
    let configs = grid.configs(base);
    let total = configs.len();
    let mut outcomes = Vec::with_capacity(total);
    for (i, config) in configs.into_iter().enumerate() {
        tracing::info!(
            run = i + 1,
            total,
            backend = %config.backend,
            nlist = config.index.nlist,
            nprobe = config.search.nprobe,
            batch_size = config.batch_size,
            "[sweep] starting"
        );
        let result = match BenchmarkRun::new(config.clone()).and_then(|run| run.run()) {
            Err(e) if e.is_fatal_for_run() => return Err(e),
            result => result,
        };
        match &result {
            Err(e) => tracing::warn!(error = %e, "[sweep] run failed; continuing"),
            Ok(report) if !report.succeeded() => {
                tracing::warn!(run_dir = %report.run_dir.display(), "[sweep] run recorded an error");
            }
            Ok(_) => {}
        }
        outcomes.push(SweepOutcome { config, result });
    }
    Ok(outcomes)
}

fn active(store: &mut Option<Box<dyn VectorStore>>) -> Result<&mut dyn VectorStore> {
    match store.as_deref_mut() {
        Some(store) => Ok(store),
        None => Err(Error::InvalidArgument("store is not open".into())),
    }
}

/// One query, timed but not scored.
fn warmup(
    store: &mut dyn VectorStore,
    queries: &QuerySet,
    k: usize,
    params: &SearchParams,
    details: &mut PhaseDetails,
) -> Result<()> {
    if queries.ids.is_empty() {
        details.insert("warmup_queries", 0u64);
        return Ok(());
    }
    store.search(queries.vectors.row(0), k, params)?;
    details.insert("warmup_queries", 1u64);
    Ok(())
}

/// Search every query. A failing query is logged, scores zero recall and
/// contributes no latency sample.
fn search(store: &mut dyn VectorStore, queries: &QuerySet, k: usize, params: &SearchParams) -> SearchStats {
    let mut latencies = Vec::with_capacity(queries.ids.len());
    let mut recall_sum = 0.0;
    let mut recall_count = 0usize;
    let mut failed = 0usize;

    for (i, (&id, truth)) in queries.ids.iter().zip(&queries.truth).enumerate() {
        let start = Instant::now();
        let result = store.search(queries.vectors.row(i), k, params);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(hits) => {
                latencies.push(elapsed_ms);
                let retrieved: Vec<u64> = hits.iter().map(|h| h.id).collect();
                recall_sum += recall_at_k(&retrieved, truth, k);
            }
            Err(e) => {
                tracing::warn!(query_id = id, error = %e, "search failed");
                failed += 1;
            }
        }
        recall_count += 1;
    }

    SearchStats {
        queries: queries.ids.len(),
        recall_mean: (recall_count > 0).then(|| recall_sum / recall_count as f64),
        recall_count,
        failed_queries: failed,
        latency: LatencyStats::from_latencies(&latencies),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{IndexParams, SearchHit};
    use crate::ground_truth::{generate_ground_truth, GenerateOptions, GroundTruthConfig};
    use crate::layout::DatasetLayout;
    use crate::rss::FixedRss;
    use crate::synthetic::{SyntheticConfig, SyntheticCorpus};
    use tempfile::TempDir;

    fn dataset(dir: &Path, rows: u64) {
        let layout = DatasetLayout::default();
        let config = SyntheticConfig::new(rows, 8).with_shard_size(30);
        SyntheticCorpus::write_dataset(dir, &layout, "100", &config).unwrap();
        let options = GenerateOptions::default()
            .with_num_queries(10)
            .with_ground_truth(GroundTruthConfig::default().with_k(5));
        generate_ground_truth(dir, &layout, &options).unwrap();
    }

    fn config(data: &Path, runs: &Path) -> BenchmarkConfig {
        BenchmarkConfig::new(data)
            .with_backend("flat")
            .with_k(5)
            .with_batch_size(40)
            .with_db_root(runs)
    }

    #[test]
    fn test_flat_run_has_perfect_recall() {
        let data = TempDir::new().unwrap();
        let runs = TempDir::new().unwrap();
        dataset(data.path(), 100);

        let run = BenchmarkRun::new(config(data.path(), runs.path()))
            .unwrap()
            .with_sampler(Box::new(FixedRss::constant(1.0)));
        let report = run.run().unwrap();
        assert!(report.succeeded(), "{:?}", report.document.error);
        assert_eq!(report.document.recall["search"].mean, Some(1.0));
        assert_eq!(report.document.recall["search_after_reopen"].mean, Some(1.0));
        assert_eq!(report.document.phases["ingest"].details.get_u64("rows"), Some(100));
        assert!(report.results_json.exists());
        assert!(report.results_md.exists());
        // the store is cleaned up after a successful run without keep_db
        assert!(!report.run_dir.join(DB_DIR).exists());
        assert_eq!(run.map_stats().peak_open(), 1);
    }

    #[test]
    fn test_explicit_query_ids_are_filtered() {
        let data = TempDir::new().unwrap();
        let runs = TempDir::new().unwrap();
        dataset(data.path(), 60);
        let truth_path = DatasetLayout::default().ground_truth_path(data.path(), "100");
        let truth = GroundTruthFile::read(&truth_path).unwrap();
        let known = truth.query_ids()[0];
        let unknown = (0..60).find(|id| truth.get(*id).is_none()).unwrap();

        let config = config(data.path(), runs.path()).with_query_ids(Some(vec![known, 999, unknown]));
        let run = BenchmarkRun::new(config).unwrap();
        let report = run.run().unwrap();
        assert_eq!(report.document.config["queries"], Value::from(1u64));
    }

    struct FailingSearchBackend;

    struct FailingStore {
        inner: Box<dyn VectorStore>,
        calls: usize,
    }

    impl IndexBackend for FailingSearchBackend {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn create(&self, path: &Path, dim: usize, metric: crate::metric::Metric) -> Result<Box<dyn VectorStore>> {
            Ok(Box::new(FailingStore {
                inner: crate::backend::FlatBackend.create(path, dim, metric)?,
                calls: 0,
            }))
        }
        fn open(&self, _path: &Path) -> Result<Box<dyn VectorStore>> {
            Err(Error::backend(crate::error::BackendOp::Open, "cannot reopen"))
        }
    }

    impl VectorStore for FailingStore {
        fn insert_batch(&mut self, first_id: u64, rows: &[f32]) -> Result<()> {
            self.inner.insert_batch(first_id, rows)
        }
        fn create_index(&mut self, params: &IndexParams) -> Result<()> {
            self.inner.create_index(params)
        }
        fn build_now(&mut self) -> Result<bool> {
            Ok(false)
        }
        fn search(&mut self, query: &[f32], k: usize, params: &SearchParams) -> Result<Vec<SearchHit>> {
            // the warmup query succeeds, then every other query fails
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(Error::backend(crate::error::BackendOp::Search, "flaky"));
            }
            self.inner.search(query, k, params)
        }
        fn len(&self) -> u64 {
            self.inner.len()
        }
        fn close(self: Box<Self>) -> Result<()> {
            self.inner.close()
        }
    }

    #[test]
    fn test_failures_are_recorded_not_fatal_until_reopen() {
        let data = TempDir::new().unwrap();
        let runs = TempDir::new().unwrap();
        dataset(data.path(), 100);

        let run = BenchmarkRun::new(config(data.path(), runs.path()))
            .unwrap()
            .with_backend(Box::new(FailingSearchBackend));
        let report = run.run().unwrap();
        let doc = &report.document;

        // searches with failing queries still complete
        let search = &doc.phases["search"];
        assert_eq!(search.details.get_u64("failed_queries"), Some(5));
        assert_eq!(search.details.get_u64("recall_count"), Some(10));

        // open_db failure aborts the run and is reported
        assert!(!doc.succeeded());
        assert!(doc.error.as_deref().unwrap_or("").contains("cannot reopen"));
        assert!(doc.phases.contains_key("open_db"));
        assert!(!doc.phases.contains_key("search_after_reopen"));
        assert!(!doc.phases.contains_key("close_db_final"));
        assert!(report.results_json.exists());
        // failed runs keep the store for inspection
        assert!(report.run_dir.join(DB_DIR).exists());
    }

    #[test]
    fn test_sweep_grid_combinations() {
        let base = BenchmarkConfig::new("d").with_backend("ivf");
        let grid = SweepGrid::default()
            .with_nlists(vec![4, 8])
            .with_nprobes(vec![1, 2, 4]);
        let configs = grid.configs(&base);
        assert_eq!(configs.len(), 6);
        assert!(configs.iter().all(|c| c.backend == "ivf"));
        assert_eq!(configs[0].index.nlist, 4);
        assert_eq!(configs[0].search.nprobe, 1);
        assert_eq!(configs[5].index.nlist, 8);
        assert_eq!(configs[5].search.nprobe, 4);
        assert_eq!(SweepGrid::default().configs(&base).len(), 1);
    }

    #[test]
    fn test_sweep_continues_past_failed_runs() {
        let data = TempDir::new().unwrap();
        let runs = TempDir::new().unwrap();
        dataset(data.path(), 60);

        let base = config(data.path(), runs.path());
        let grid = SweepGrid::default().with_backends(vec!["nope".into(), "flat".into()]);
        let outcomes = sweep(&base, &grid).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.as_ref().unwrap().succeeded());
    }

    #[test]
    fn test_sweep_stops_on_missing_dataset() {
        let data = TempDir::new().unwrap();
        let runs = TempDir::new().unwrap();
        let base = config(data.path(), runs.path());
        let err = sweep(&base, &SweepGrid::default()).unwrap_err();
        assert!(err.is_fatal_for_run());
    }
}
