//! Index backends under benchmark.
//!
//! An [`IndexBackend`] is a factory that creates or reopens a persisted
//! [`VectorStore`]. Every store reports results as [`SearchHit`]s, so the
//! orchestrator and the scoring code never branch on which backend produced
//! them.
//!
//! Two reference adapters ship with the crate:
//!
//! - [`flat::FlatBackend`]: exact brute force; recall is 1.0 by construction.
//! - [`ivf::IvfBackend`]: IVF-Flat with a seeded k-means coarse quantiser and
//!   lazy list construction.

pub mod flat;
pub mod ivf;
mod storage;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metric::Metric;

pub use flat::FlatBackend;
pub use ivf::IvfBackend;

/// One search result, best-first within a result list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: u64,
    pub score: f32,
}

/// Index construction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    /// Number of inverted lists.
    pub nlist: usize,
    /// Rows sampled to train the coarse quantiser.
    pub train_sample: usize,
    /// k-means iterations.
    pub train_iters: usize,
    pub seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            nlist: 256,
            train_sample: 50_000,
            train_iters: 10,
            seed: 42,
        }
    }
}

impl IndexParams {
    pub fn with_nlist(mut self, nlist: usize) -> Self {
        self.nlist = nlist;
        self
    }

    pub fn with_train_sample(mut self, n: usize) -> Self {
        self.train_sample = n;
        self
    }

    pub fn with_train_iters(mut self, iters: usize) -> Self {
        self.train_iters = iters;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Query-time parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Inverted lists probed per query.
    pub nprobe: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self { nprobe: 16 }
    }
}

impl SearchParams {
    pub fn with_nprobe(mut self, nprobe: usize) -> Self {
        self.nprobe = nprobe;
        self
    }
}

/// Creates and reopens stores rooted at a directory.
pub trait IndexBackend {
    fn name(&self) -> &'static str;

    /// Create an empty store at `path`, replacing anything already there.
    fn create(&self, path: &Path, dim: usize, metric: Metric) -> Result<Box<dyn VectorStore>>;

    /// Reopen a store previously closed at `path`.
    fn open(&self, path: &Path) -> Result<Box<dyn VectorStore>>;
}

/// A live store. Calls are blocking; there is no timeout.
pub trait VectorStore {
    /// Append rows whose ids are `first_id..first_id + n`.
    fn insert_batch(&mut self, first_id: u64, rows: &[f32]) -> Result<()>;

    /// Declare the index. Backends may defer construction.
    fn create_index(&mut self, params: &IndexParams) -> Result<()>;

    /// Force any deferred construction; `true` if work was done.
    fn build_now(&mut self) -> Result<bool>;

    fn search(&mut self, query: &[f32], k: usize, params: &SearchParams) -> Result<Vec<SearchHit>>;

    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persist and release the store.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Backend names accepted by [`backend_by_name`].
pub const BACKENDS: &[&str] = &["flat", "ivf"];

pub fn backend_by_name(name: &str) -> Result<Box<dyn IndexBackend>> {
    match name.to_lowercase().as_str() {
        "flat" | "exact" => Ok(Box::new(FlatBackend)),
        "ivf" | "ivf_flat" | "ivf-flat" => Ok(Box::new(IvfBackend)),
        other => Err(Error::InvalidArgument(format!(
            "unknown backend '{}', expected one of {:?}",
            other, BACKENDS
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_by_name() {
        assert_eq!(backend_by_name("flat").unwrap().name(), "flat");
        assert_eq!(backend_by_name("IVF").unwrap().name(), "ivf");
        assert!(matches!(backend_by_name("hnsw"), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_params_defaults() {
        let params = IndexParams::default().with_nlist(8);
        assert_eq!(params.nlist, 8);
        assert_eq!(params.seed, 42);
        assert_eq!(SearchParams::default().nprobe, 16);
    }
}
