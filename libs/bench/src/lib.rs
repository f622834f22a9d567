//! Shard-streamed vector corpora, exact ground truth and phase-timed
//! ANN benchmarks.
//!
//! A dataset is a directory of fixed-width little-endian `float32` shards plus
//! a JSON metadata sidecar and a JSONL ground-truth sidecar:
//!
//! ```text
//! msmarco-passages-1M.meta.json
//! msmarco-passages-1M.shard0000.f32
//! msmarco-passages-1M.shard0001.f32
//! msmarco-passages-1M.gt.jsonl
//! ```
//!
//! - [`catalog`] resolves the newest label into an ordered [`ShardCatalog`]
//! - [`stream`] reads the corpus in bounded batches, one shard map at a time
//! - [`materialize`] fetches arbitrary rows by global id
//! - [`ground_truth`] computes exact top-k by a chunked brute-force scan
//! - [`orchestrator`] times ingest, index build and search against an
//!   [`backend::IndexBackend`], then [`report`] writes the results
//!
//! ```no_run
//! use shardbench::{BenchmarkConfig, BenchmarkRun};
//!
//! let config = BenchmarkConfig::new("./data/msmarco").with_backend("ivf");
//! let report = BenchmarkRun::new(config)?.run()?;
//! println!("recall = {:?}", report.document.final_recall());
//! # Ok::<(), shardbench::Error>(())
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod ground_truth;
pub mod layout;
pub mod mapping;
pub mod materialize;
pub mod metric;
pub mod metrics;
pub mod orchestrator;
pub mod phase;
pub mod report;
pub mod rss;
pub mod stream;
pub mod synthetic;
pub mod topk;
pub mod writer;

#[cfg(test)]
mod testutil;

pub use backend::{backend_by_name, IndexBackend, IndexParams, SearchHit, SearchParams, VectorStore};
pub use catalog::{DatasetMeta, ResolvedDataset, ShardCatalog, ShardDescriptor};
pub use config::BenchmarkConfig;
pub use error::{BackendOp, Error, Result};
pub use ground_truth::{
    generate_ground_truth, GenerateOptions, GroundTruth, GroundTruthConfig, GroundTruthEngine,
    GroundTruthEntry, GroundTruthFile,
};
pub use layout::DatasetLayout;
pub use mapping::{MapStats, ShardMap};
pub use materialize::{QueryMaterializer, QueryMatrix};
pub use metric::Metric;
pub use orchestrator::{sweep, BenchmarkRun, RunReport, SweepGrid, SweepOutcome};
pub use phase::{PhaseClock, PhaseDetails, PhaseRecord};
pub use report::ResultsDocument;
pub use rss::{FixedRss, ProcRss, RssSampler};
pub use stream::{Batch, CorpusStream, StreamOptions};
pub use synthetic::{SyntheticConfig, SyntheticCorpus};
pub use topk::{BoundedTopK, Neighbor};
pub use writer::{ShardWriter, WriterOptions};
