//! IVF-Flat store.
//!
//! A k-means coarse quantiser splits the rows into `nlist` inverted lists; a
//! query scans the `nprobe` lists whose centroids score best. Construction is
//! lazy: [`VectorStore::create_index`] only records the parameters and the
//! lists are built by [`VectorStore::build_now`] or the first search. The
//! trained lists are persisted next to the vectors, so a reopened store does
//! not retrain.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::storage::VectorFile;
use super::{IndexBackend, IndexParams, SearchHit, SearchParams, VectorStore};
use crate::error::{BackendOp, Error, Result};
use crate::metric::{Metric, PreparedQueries};
use crate::topk::BoundedTopK;

const NAME: &str = "ivf";
const CENTROIDS_FILE: &str = "ivf_centroids.f32";
const LISTS_FILE: &str = "ivf_lists.bin";
/// Rows scored per block while assigning rows to lists.
const ASSIGN_BLOCK_ROWS: usize = 4096;

#[derive(Debug, Clone, Copy, Default)]
pub struct IvfBackend;

impl IndexBackend for IvfBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn create(&self, path: &Path, dim: usize, metric: Metric) -> Result<Box<dyn VectorStore>> {
        Ok(Box::new(IvfStore {
            vectors: VectorFile::create(path, dim, metric, &[CENTROIDS_FILE, LISTS_FILE])?,
            params: None,
            index: None,
        }))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn VectorStore>> {
        let (vectors, manifest) = VectorFile::open(path, NAME)?;
        let index = if manifest.index.is_some() && path.join(LISTS_FILE).exists() {
            Some(IvfIndex::load(path, vectors.dim, vectors.len())?)
        } else {
            None
        };
        Ok(Box::new(IvfStore {
            vectors,
            params: manifest.index,
            index,
        }))
    }
}

/// Trained coarse quantiser and the ids in each list.
#[derive(Debug, Clone, PartialEq)]
struct IvfIndex {
    dim: usize,
    centroids: Vec<f32>,
    lists: Vec<Vec<u64>>,
}

impl IvfIndex {
    fn nlist(&self) -> usize {
        self.lists.len()
    }

    fn train(vectors: &VectorFile, params: &IndexParams) -> Self {
        let dim = vectors.dim;
        let metric = vectors.metric;
        let n = vectors.len() as usize;
        let nlist = params.nlist.max(1).min(n);
        if nlist == 0 {
            return Self {
                dim,
                centroids: Vec::new(),
                lists: Vec::new(),
            };
        }

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let sample_size = params.train_sample.max(nlist).min(n);
        let sample: Vec<u64> = rand::seq::index::sample(&mut rng, n, sample_size)
            .into_iter()
            .map(|i| i as u64)
            .collect();

        let mut centroids: Vec<f32> = Vec::with_capacity(nlist * dim);
        for &id in sample.iter().take(nlist) {
            centroids.extend_from_slice(vectors.row(id));
        }

        let mut training: Vec<f32> = Vec::with_capacity(sample.len() * dim);
        for &id in &sample {
            training.extend_from_slice(vectors.row(id));
        }

        for _ in 0..params.train_iters {
            let assignment = assign(&training, &centroids, dim, metric);
            let mut sums = vec![0.0f64; nlist * dim];
            let mut counts = vec![0usize; nlist];
            for (row, &c) in training.chunks_exact(dim).zip(&assignment) {
                counts[c] += 1;
                for (s, &v) in sums[c * dim..(c + 1) * dim].iter_mut().zip(row) {
                    *s += v as f64;
                }
            }
            for c in 0..nlist {
                // Empty clusters keep their previous centroid.
                if counts[c] == 0 {
                    continue;
                }
                let centroid = &mut centroids[c * dim..(c + 1) * dim];
                for (dst, &s) in centroid.iter_mut().zip(&sums[c * dim..(c + 1) * dim]) {
                    *dst = (s / counts[c] as f64) as f32;
                }
                if metric == Metric::Cosine {
                    shardbench_core::distance::normalize(centroid);
                }
            }
        }

        let mut lists = vec![Vec::new(); nlist];
        let mut id = 0u64;
        for block in vectors.data().chunks(ASSIGN_BLOCK_ROWS * dim) {
            for c in assign(block, &centroids, dim, metric) {
                lists[c].push(id);
                id += 1;
            }
        }

        Self { dim, centroids, lists }
    }

    /// Indices of the `nprobe` best centroids for `query`.
    fn probe(&self, query: &[f32], metric: Metric, nprobe: usize) -> Vec<usize> {
        let mut best = BoundedTopK::new(nprobe.max(1));
        for (c, centroid) in self.centroids.chunks_exact(self.dim).enumerate() {
            best.offer(c as u64, metric.score(query, centroid));
        }
        best.into_sorted().into_iter().map(|n| n.doc_id as usize).collect()
    }

    fn save(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CENTROIDS_FILE);
        let mut file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        file.write_all(bytemuck::cast_slice(&self.centroids))
            .map_err(|e| Error::io(&path, e))?;
        file.sync_all().map_err(|e| Error::io(&path, e))?;

        let path = dir.join(LISTS_FILE);
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        let mut out = BufWriter::new(file);
        let io = |e| Error::io(dir.join(LISTS_FILE), e);
        out.write_u64::<LittleEndian>(self.lists.len() as u64).map_err(io)?;
        for list in &self.lists {
            out.write_u64::<LittleEndian>(list.len() as u64).map_err(io)?;
            for &id in list {
                out.write_u64::<LittleEndian>(id).map_err(io)?;
            }
        }
        let file = out.into_inner().map_err(|e| io(e.into_error()))?;
        file.sync_all().map_err(io)
    }

    /// Read back a saved index; every listed id must be below `rows`.
    fn load(dir: &Path, dim: usize, rows: u64) -> Result<Self> {
        let path = dir.join(CENTROIDS_FILE);
        let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        let centroids: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);

        let path = dir.join(LISTS_FILE);
        let file = File::open(&path).map_err(|e| Error::io(&path, e))?;
        let mut input = BufReader::new(file);
        let io = |e| Error::io(dir.join(LISTS_FILE), e);
        let nlist = input.read_u64::<LittleEndian>().map_err(io)? as usize;
        if centroids.len() != nlist * dim {
            return Err(Error::backend(
                BackendOp::Open,
                format!("{} centroids values for {} lists of dim {}", centroids.len(), nlist, dim),
            ));
        }
        let mut lists = Vec::with_capacity(nlist);
        for c in 0..nlist {
            let len = input.read_u64::<LittleEndian>().map_err(io)?;
            if len > rows {
                return Err(Error::backend(
                    BackendOp::Open,
                    format!("list {} holds {} ids but the store has {} rows", c, len, rows),
                ));
            }
            let mut list = vec![0u64; len as usize];
            input.read_u64_into::<LittleEndian>(&mut list).map_err(io)?;
            if let Some(&id) = list.iter().find(|&&id| id >= rows) {
                return Err(Error::backend(
                    BackendOp::Open,
                    format!("list {} references id {} but the store has {} rows", c, id, rows),
                ));
            }
            lists.push(list);
        }
        Ok(Self { dim, centroids, lists })
    }
}

/// Best centroid per row of `rows`.
fn assign(rows: &[f32], centroids: &[f32], dim: usize, metric: Metric) -> Vec<usize> {
    let prepared = PreparedQueries::new(metric, centroids, dim);
    let nlist = prepared.len();
    let mut scores = Vec::new();
    prepared.score_block(rows, &mut scores);
    scores
        .chunks_exact(nlist)
        .map(|row| {
            let mut best = 0;
            for (c, &s) in row.iter().enumerate() {
                if s > row[best] {
                    best = c;
                }
            }
            best
        })
        .collect()
}

pub struct IvfStore {
    vectors: VectorFile,
    params: Option<IndexParams>,
    index: Option<IvfIndex>,
}

impl IvfStore {
    fn ensure_built(&mut self) -> Result<bool> {
        let Some(params) = self.params.as_ref() else {
            return Ok(false);
        };
        if self.index.is_some() {
            return Ok(false);
        }
        let start = Instant::now();
        let index = IvfIndex::train(&self.vectors, params);
        tracing::info!(
            rows = self.vectors.len(),
            nlist = index.nlist(),
            elapsed_sec = start.elapsed().as_secs_f64(),
            "[ivf] index built"
        );
        self.index = Some(index);
        Ok(true)
    }
}

impl VectorStore for IvfStore {
    fn insert_batch(&mut self, first_id: u64, rows: &[f32]) -> Result<()> {
        self.vectors.append(first_id, rows)?;
        if self.index.take().is_some() {
            tracing::debug!("[ivf] insert after build; lists will be rebuilt");
        }
        Ok(())
    }

    fn create_index(&mut self, params: &IndexParams) -> Result<()> {
        if params.nlist == 0 {
            return Err(Error::backend(BackendOp::CreateIndex, "nlist must be positive"));
        }
        self.params = Some(params.clone());
        self.index = None;
        Ok(())
    }

    fn build_now(&mut self) -> Result<bool> {
        self.ensure_built()
    }

    fn search(&mut self, query: &[f32], k: usize, params: &SearchParams) -> Result<Vec<SearchHit>> {
        self.vectors.check_query(query)?;
        if self.params.is_none() {
            return Err(Error::backend(BackendOp::Search, "create_index was never called"));
        }
        self.ensure_built()?;
        let Some(index) = self.index.as_ref() else {
            return Err(Error::backend(BackendOp::Search, "index not built"));
        };
        let probes = index.probe(query, self.vectors.metric, params.nprobe);
        let candidates = probes.iter().flat_map(|&c| index.lists[c].iter());
        Ok(self.vectors.top_k_among(query, k, candidates))
    }

    fn len(&self) -> u64 {
        self.vectors.len()
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        let dir = self.vectors.dir().to_path_buf();
        match &self.index {
            Some(index) => index.save(&dir)?,
            None => {
                for name in [CENTROIDS_FILE, LISTS_FILE] {
                    let path = dir.join(name);
                    if path.exists() {
                        fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
                    }
                }
            }
        }
        let params = self.params.take();
        self.vectors.persist(NAME, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticCorpus;
    use tempfile::TempDir;

    fn filled_store(dir: &Path, rows: u64, dim: usize) -> (Box<dyn VectorStore>, Vec<f32>) {
        let mut store = IvfBackend.create(dir, dim, Metric::Cosine).unwrap();
        let data = SyntheticCorpus::new(dim, rows, 9).next_batch(rows as usize).unwrap();
        store.insert_batch(0, &data).unwrap();
        (store, data)
    }

    #[test]
    fn test_lazy_build() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = filled_store(dir.path(), 200, 8);
        assert!(store.search(&[0.0; 8], 5, &SearchParams::default()).is_err());

        store.create_index(&IndexParams::default().with_nlist(4)).unwrap();
        assert!(store.build_now().unwrap());
        assert!(!store.build_now().unwrap());
    }

    #[test]
    fn test_full_probe_is_exact() {
        let dir = TempDir::new().unwrap();
        let (mut store, data) = filled_store(dir.path(), 300, 8);
        store.create_index(&IndexParams::default().with_nlist(6)).unwrap();

        let query = &data[17 * 8..18 * 8];
        let hits = store
            .search(query, 10, &SearchParams::default().with_nprobe(6))
            .unwrap();
        assert_eq!(hits.len(), 10);
        assert_eq!(hits[0].id, 17);
        assert!((hits[0].score - 1.0).abs() < 1e-5);

        let mut scores = Vec::new();
        PreparedQueries::new(Metric::Cosine, query, 8).score_block(&data, &mut scores);
        let mut exact = BoundedTopK::new(10);
        for (id, &score) in scores.iter().enumerate() {
            exact.offer(id as u64, score);
        }
        let exact_ids: Vec<u64> = exact.into_sorted().iter().map(|n| n.doc_id).collect();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), exact_ids);
    }

    #[test]
    fn test_reopen_keeps_trained_lists() {
        let dir = TempDir::new().unwrap();
        let (mut store, data) = filled_store(dir.path(), 120, 4);
        store.create_index(&IndexParams::default().with_nlist(5)).unwrap();
        let query = &data[0..4];
        let params = SearchParams::default().with_nprobe(2);
        let before = store.search(query, 5, &params).unwrap();
        store.close().unwrap();
        assert!(dir.path().join(LISTS_FILE).exists());

        let mut reopened = IvfBackend.open(dir.path()).unwrap();
        assert!(!reopened.build_now().unwrap());
        assert_eq!(reopened.search(query, 5, &params).unwrap(), before);
    }

    #[test]
    fn test_open_rejects_out_of_range_list_ids() {
        let dir = TempDir::new().unwrap();
        let (mut store, _) = filled_store(dir.path(), 40, 4);
        store.create_index(&IndexParams::default().with_nlist(2)).unwrap();
        store.build_now().unwrap();
        store.close().unwrap();

        // two lists: [7, 40] and []
        let mut bytes = Vec::new();
        for v in [2u64, 2, 7, 40, 0] {
            bytes.write_u64::<LittleEndian>(v).unwrap();
        }
        fs::write(dir.path().join(LISTS_FILE), bytes).unwrap();

        match IvfBackend.open(dir.path()) {
            Err(Error::Backend { op: BackendOp::Open, message }) => assert!(message.contains("id 40")),
            other => panic!("expected open failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_more_lists_than_rows() {
        let dir = TempDir::new().unwrap();
        let (mut store, data) = filled_store(dir.path(), 3, 4);
        store.create_index(&IndexParams::default().with_nlist(64)).unwrap();
        let hits = store.search(&data[4..8], 3, &SearchParams::default()).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, 1);
    }
}
