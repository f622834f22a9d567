//! CLI command implementations for shard benchmarks.
//!
//! - Generate: write a synthetic unit-vector dataset (optionally with ground truth)
//! - Inspect: show the resolved catalog, metadata and ground-truth sidecar
//! - GroundTruth: exact top-k by a bounded-memory streaming scan
//! - Run / Sweep: phase-timed benchmarks against the index backends
//! - Summarize: one table over every results.json under a runs directory

use anyhow::{bail, Context, Result};
use clap::{Args, Parser};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use shardbench::config::DEFAULT_DB_ROOT;
use shardbench::ground_truth::{DEFAULT_CHUNK_ROWS, DEFAULT_GT_K, DEFAULT_NUM_QUERIES, DEFAULT_SEED};
use shardbench::report::{self, format_duration, render_summary, SummaryRow};
use shardbench::{
    generate_ground_truth, BenchmarkConfig, BenchmarkRun, DatasetLayout, GenerateOptions,
    GroundTruthConfig, GroundTruthFile, IndexParams, Metric, ResultsDocument, RunReport,
    SearchParams, ShardCatalog, SweepGrid, SyntheticConfig, SyntheticCorpus,
};

// ============================================================================
// Generate Command
// ============================================================================

#[derive(Parser)]
pub struct GenerateArgs {
    /// Directory to write shards and sidecars into
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Dataset label (default: derived from --rows, e.g. 100K, 1M)
    #[arg(long)]
    pub label: Option<String>,

    /// Number of rows
    #[arg(long, default_value = "10000")]
    pub rows: u64,

    /// Vector dimension
    #[arg(long, default_value = "128")]
    pub dim: usize,

    /// Rows per shard file
    #[arg(long, default_value = "100000")]
    pub shard_size: u64,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Also compute the ground-truth sidecar
    #[arg(long)]
    pub ground_truth: bool,

    /// Ground-truth queries (with --ground-truth)
    #[arg(long, default_value_t = DEFAULT_NUM_QUERIES)]
    pub queries: usize,

    /// Ground-truth depth (with --ground-truth)
    #[arg(long, default_value_t = DEFAULT_GT_K)]
    pub k: usize,

    /// Similarity metric for ground truth: cosine, dot, l2
    #[arg(long, default_value = "cosine")]
    pub metric: Metric,
}

pub fn generate(args: GenerateArgs) -> Result<()> {
    let label = args.label.clone().unwrap_or_else(|| rows_label(args.rows));
    let layout = DatasetLayout::default();
    let config = SyntheticConfig::new(args.rows, args.dim)
        .with_seed(args.seed)
        .with_shard_size(args.shard_size);

    println!("=== Generate ===");
    println!("Rows: {}, Dim: {}, Shard size: {}", args.rows, args.dim, args.shard_size);
    let catalog = SyntheticCorpus::write_dataset(&args.data_dir, &layout, &label, &config)
        .with_context(|| format!("Failed to write dataset to {:?}", args.data_dir))?;
    println!(
        "Wrote {} rows in {} shards (label {})",
        catalog.total_rows(),
        catalog.num_shards(),
        catalog.label
    );

    if args.ground_truth {
        let options = GenerateOptions::default()
            .with_num_queries(args.queries)
            .with_seed(args.seed)
            .with_ground_truth(GroundTruthConfig::default().with_k(args.k).with_metric(args.metric));
        let generated = generate_ground_truth(&args.data_dir, &layout, &options)
            .context("Failed to compute ground truth")?;
        println!(
            "Ground truth: {} queries, k={} -> {:?}",
            generated.num_queries, args.k, generated.path
        );
    }
    Ok(())
}

/// `1000000 -> "1M"`, `250000 -> "250K"`, otherwise the plain count.
fn rows_label(rows: u64) -> String {
    if rows > 0 && rows % 1_000_000 == 0 {
        format!("{}M", rows / 1_000_000)
    } else if rows > 0 && rows % 1_000 == 0 {
        format!("{}K", rows / 1_000)
    } else {
        rows.to_string()
    }
}

// ============================================================================
// Inspect Command
// ============================================================================

#[derive(Parser)]
pub struct InspectArgs {
    /// Dataset directory
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// List every shard
    #[arg(long)]
    pub shards: bool,
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    let layout = DatasetLayout::default();
    let (catalog, meta) = ShardCatalog::scan(&args.data_dir, &layout)
        .with_context(|| format!("Failed to resolve dataset in {:?}", args.data_dir))?;

    println!("=== Dataset {:?} ===", args.data_dir);
    println!("Label:  {}", catalog.label);
    println!("Dim:    {} ({})", catalog.dim, meta.dtype);
    println!("Rows:   {}", catalog.total_rows());
    println!("Shards: {}", catalog.num_shards());
    if let Some(count) = meta.count {
        println!("Meta count: {}", count);
    }
    if args.shards {
        println!("\n{:>6} {:>12} {:>10}  {}", "shard", "start", "rows", "path");
        for (i, shard) in catalog.shards().iter().enumerate() {
            println!("{:>6} {:>12} {:>10}  {}", i, shard.start, shard.count, shard.path.display());
        }
    }

    let gt_path = layout.ground_truth_path(&args.data_dir, &catalog.label);
    if gt_path.exists() {
        let truth = GroundTruthFile::read(&gt_path)?;
        println!(
            "\nGround truth: {} queries, depth {} ({:?})",
            truth.len(),
            truth.min_depth(),
            gt_path
        );
    } else {
        println!("\nGround truth: missing ({:?})", gt_path);
    }
    Ok(())
}

// ============================================================================
// Ground Truth Command
// ============================================================================

#[derive(Parser)]
pub struct GroundTruthArgs {
    /// Dataset directory
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Number of sampled query ids
    #[arg(long, default_value_t = DEFAULT_NUM_QUERIES)]
    pub queries: usize,

    /// Explicit query ids (comma-separated); overrides --queries
    #[arg(long)]
    pub query_ids: Option<String>,

    /// Neighbors per query
    #[arg(long, default_value_t = DEFAULT_GT_K)]
    pub k: usize,

    /// Similarity metric: cosine, dot, l2
    #[arg(long, default_value = "cosine")]
    pub metric: Metric,

    /// Sampling seed
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Corpus rows scored per block
    #[arg(long, default_value_t = DEFAULT_CHUNK_ROWS)]
    pub chunk_rows: usize,

    /// Log progress every N rows
    #[arg(long)]
    pub progress_every: Option<u64>,
}

pub fn ground_truth(args: GroundTruthArgs) -> Result<()> {
    let query_ids = args
        .query_ids
        .as_deref()
        .map(|s| parse_list::<u64>(s, "query id"))
        .transpose()?;
    let options = GenerateOptions::default()
        .with_num_queries(args.queries)
        .with_seed(args.seed)
        .with_query_ids(query_ids)
        .with_ground_truth(
            GroundTruthConfig::default()
                .with_k(args.k)
                .with_metric(args.metric)
                .with_chunk_rows(args.chunk_rows)
                .with_progress_every_rows(args.progress_every),
        );

    println!("=== Ground Truth ===");
    let generated = generate_ground_truth(&args.data_dir, &DatasetLayout::default(), &options)
        .context("Failed to compute ground truth")?;
    println!("Label:   {}", generated.label);
    println!("Queries: {}, k={}, metric={}", generated.num_queries, args.k, args.metric);
    println!("Scanned: {} rows in {}", generated.rows_scanned, format_duration(generated.elapsed_sec));
    println!("Output:  {:?}", generated.path);
    Ok(())
}

// ============================================================================
// Run Command
// ============================================================================

/// Options shared by `run` and `sweep`.
#[derive(Args)]
pub struct BenchArgs {
    /// Dataset directory
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,

    /// Similarity metric: cosine, dot, l2
    #[arg(long, default_value = "cosine")]
    pub metric: Metric,

    /// Recall@k depth
    #[arg(long, default_value_t = DEFAULT_GT_K)]
    pub k: usize,

    /// Queries taken from the head of the ground-truth file
    #[arg(long, default_value_t = DEFAULT_NUM_QUERIES)]
    pub queries: usize,

    /// Explicit query ids (comma-separated); overrides --queries
    #[arg(long)]
    pub query_ids: Option<String>,

    /// Rows to ingest (default: whole corpus)
    #[arg(long)]
    pub count: Option<u64>,

    /// Vectors sampled to train the IVF quantiser
    #[arg(long, default_value = "50000")]
    pub train_sample: usize,

    /// k-means iterations
    #[arg(long, default_value = "10")]
    pub train_iters: usize,

    /// Seed for index training
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Parent directory of per-run directories
    #[arg(long, default_value = DEFAULT_DB_ROOT)]
    pub db_root: PathBuf,

    /// Keep the store after a successful run
    #[arg(long)]
    pub keep_db: bool,

    /// Assert minimum recall (exit code 1 if any run is below)
    /// Example: --assert-recall 0.90
    #[arg(long)]
    pub assert_recall: Option<f64>,
}

impl BenchArgs {
    fn config(&self) -> Result<BenchmarkConfig> {
        let query_ids = self
            .query_ids
            .as_deref()
            .map(|s| parse_list::<u64>(s, "query id"))
            .transpose()?;
        let index = IndexParams::default()
            .with_train_sample(self.train_sample)
            .with_train_iters(self.train_iters)
            .with_seed(self.seed);
        Ok(BenchmarkConfig::new(&self.data_dir)
            .with_metric(self.metric)
            .with_k(self.k)
            .with_num_queries(self.queries)
            .with_query_ids(query_ids)
            .with_count(self.count)
            .with_index(index)
            .with_seed(self.seed)
            .with_db_root(&self.db_root)
            .with_keep_db(self.keep_db))
    }
}

#[derive(Parser)]
pub struct RunArgs {
    #[command(flatten)]
    pub bench: BenchArgs,

    /// Index backend: flat, ivf
    #[arg(long, default_value = "ivf")]
    pub backend: String,

    /// IVF lists
    #[arg(long, default_value = "256")]
    pub nlist: usize,

    /// IVF lists probed per query
    #[arg(long, default_value = "16")]
    pub nprobe: usize,

    /// Rows per insert batch
    #[arg(long, default_value = "100000")]
    pub batch_size: usize,
}

pub fn run(args: RunArgs) -> Result<()> {
    let base = args.bench.config()?;
    let config = base
        .clone()
        .with_backend(&args.backend)
        .with_index(base.index.clone().with_nlist(args.nlist))
        .with_search(SearchParams::default().with_nprobe(args.nprobe))
        .with_batch_size(args.batch_size);

    println!("=== Benchmark Run ===");
    println!(
        "Backend: {}, metric={}, nlist={}, nprobe={}, batch={}",
        config.backend, config.metric, config.index.nlist, config.search.nprobe, config.batch_size
    );
    let report = BenchmarkRun::new(config)
        .context("Invalid benchmark configuration")?
        .run()
        .context("Benchmark run failed")?;
    print_report(&report);

    if let Some(error) = &report.document.error {
        bail!("Run recorded an error: {}", error);
    }
    check_recall(args.bench.assert_recall, [&report.document])
}

fn print_report(report: &RunReport) {
    let doc = &report.document;
    println!("\n{:<22} {:>10} {:>10} {:>10} {:>10}", "phase", "time", "rss_before", "rss_after", "delta");
    println!("{}", "-".repeat(66));
    for (name, phase) in &doc.phases {
        println!(
            "{:<22} {:>10} {:>10.1} {:>10.1} {:>+10.1}",
            name,
            format_duration(phase.time_sec),
            phase.rss_before_mb,
            phase.rss_after_mb,
            phase.rss_delta_mb
        );
    }

    println!();
    for name in report::SEARCH_PHASES {
        let recall = doc.recall.get(name).and_then(|r| r.mean);
        let latency = doc.latency_ms.get(name);
        match recall {
            Some(recall) => println!(
                "{:<20} recall={:.4} mean={:.3}ms p95={:.3}ms",
                name,
                recall,
                latency.and_then(|l| l.mean).unwrap_or(0.0),
                latency.and_then(|l| l.p95).unwrap_or(0.0),
            ),
            None => println!("{:<20} not run", name),
        }
    }
    println!(
        "\nPeak RSS: {:.1} MB, DB size: {:.1} MB, total: {}",
        doc.peak_rss_mb,
        doc.db_size_mb,
        format_duration(doc.total_time_sec)
    );
    println!("Results: {:?}", report.results_json);
}

// ============================================================================
// Sweep Command
// ============================================================================

#[derive(Parser)]
pub struct SweepArgs {
    #[command(flatten)]
    pub bench: BenchArgs,

    /// Backends (comma-separated)
    #[arg(long, default_value = "ivf")]
    pub backend: String,

    /// IVF list counts (comma-separated)
    #[arg(long, default_value = "256")]
    pub nlist: String,

    /// nprobe values (comma-separated)
    #[arg(long, default_value = "4,16,64")]
    pub nprobe: String,

    /// Insert batch sizes (comma-separated)
    #[arg(long, default_value = "100000")]
    pub batch_size: String,
}

pub fn sweep(args: SweepArgs) -> Result<()> {
    let grid = SweepGrid::default()
        .with_backends(parse_list(&args.backend, "backend")?)
        .with_nlists(parse_list(&args.nlist, "nlist")?)
        .with_nprobes(parse_list(&args.nprobe, "nprobe")?)
        .with_batch_sizes(parse_list(&args.batch_size, "batch size")?);
    let base = args.bench.config()?;

    println!("=== Parameter Sweep ===");
    println!("Dataset: {:?}", base.dataset_dir);
    println!("Runs: {}", grid.configs(&base).len());

    let outcomes = shardbench::sweep(&base, &grid).context("Sweep aborted")?;

    let mut rows = Vec::new();
    let mut documents = Vec::new();
    let mut failed = 0;
    for outcome in &outcomes {
        let c = &outcome.config;
        let name = format!(
            "backend={} nlist={} nprobe={} batch={}",
            c.backend, c.index.nlist, c.search.nprobe, c.batch_size
        );
        match &outcome.result {
            Ok(report) => {
                let run = dir_label(&report.run_dir);
                rows.push(SummaryRow::from_document(run, &report.document));
                if report.succeeded() {
                    documents.push(&report.document);
                } else {
                    failed += 1;
                }
            }
            Err(e) => {
                println!("FAILED {}: {}", name, e);
                failed += 1;
            }
        }
    }

    println!("\n{}", render_summary(&rows));
    println!("{} runs, {} failed", outcomes.len(), failed);
    check_recall(args.bench.assert_recall, documents)
}

fn dir_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Summarize Command
// ============================================================================

#[derive(Parser)]
pub struct SummarizeArgs {
    /// Parent directory of per-run directories
    #[arg(long, default_value = DEFAULT_DB_ROOT)]
    pub db_root: PathBuf,
}

pub fn summarize(args: SummarizeArgs) -> Result<()> {
    let rows = report::summarize(&args.db_root)
        .with_context(|| format!("Failed to read runs under {:?}", args.db_root))?;
    if rows.is_empty() {
        println!("No results found under {:?}", args.db_root);
        return Ok(());
    }
    println!("{}", render_summary(&rows));
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a comma-separated list, ignoring empty items.
fn parse_list<T>(s: &str, what: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: Display,
{
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse::<T>()
                .map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", what, item, e))
        })
        .collect()
}

fn check_recall<'a>(
    threshold: Option<f64>,
    documents: impl IntoIterator<Item = &'a ResultsDocument>,
) -> Result<()> {
    let Some(threshold) = threshold else {
        return Ok(());
    };
    for doc in documents {
        let recall = doc.final_recall().unwrap_or(0.0);
        if recall < threshold {
            bail!(
                "Recall {:.4} below threshold {:.4} ({} on {})",
                recall,
                threshold,
                doc.backend,
                doc.dataset.label
            );
        }
    }
    println!("Recall assertion passed (>= {:.4})", threshold);
    Ok(())
}
