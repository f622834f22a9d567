//! Exact brute-force store.

use std::path::Path;

use super::storage::VectorFile;
use super::{IndexBackend, IndexParams, SearchHit, SearchParams, VectorStore};
use crate::error::Result;
use crate::metric::Metric;

const NAME: &str = "flat";

#[derive(Debug, Clone, Copy, Default)]
pub struct FlatBackend;

impl IndexBackend for FlatBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create(&self, path: &Path, dim: usize, metric: Metric) -> Result<Box<dyn VectorStore>> {
        Ok(Box::new(FlatStore {
            vectors: VectorFile::create(path, dim, metric, &[])?,
            index: None,
        }))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn VectorStore>> {
        let (vectors, manifest) = VectorFile::open(path, NAME)?;
        Ok(Box::new(FlatStore {
            vectors,
            index: manifest.index,
        }))
    }
}

pub struct FlatStore {
    vectors: VectorFile,
    /// Recorded for the manifest only; a flat scan has nothing to build.
    index: Option<IndexParams>,
}

impl VectorStore for FlatStore {
    fn insert_batch(&mut self, first_id: u64, rows: &[f32]) -> Result<()> {
        self.vectors.append(first_id, rows)
    }

    fn create_index(&mut self, params: &IndexParams) -> Result<()> {
        self.index = Some(params.clone());
        Ok(())
    }

    fn build_now(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn search(&mut self, query: &[f32], k: usize, _params: &SearchParams) -> Result<Vec<SearchHit>> {
        self.vectors.check_query(query)?;
        Ok(self.vectors.top_k_all(query, k))
    }

    fn len(&self) -> u64 {
        self.vectors.len()
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        let index = self.index.take();
        self.vectors.persist(NAME, index)
    }
}
