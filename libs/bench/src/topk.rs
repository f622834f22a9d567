//! Fixed-capacity best-k selection.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// A ranked result: global row id and its score (higher is better).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub doc_id: u64,
    pub score: f32,
}

/// Heap key. `a > b` means `a` ranks ahead of `b`: higher score first, and
/// on equal scores the lower doc id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    score: OrderedFloat<f32>,
    doc_id: u64,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.doc_id.cmp(&self.doc_id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keeps the `k` best candidates offered so far.
///
/// Min-heap on rank, so the root is the current worst kept candidate. A full
/// heap admits a new candidate only if it ranks strictly ahead of the root,
/// which makes the result independent of offer order.
#[derive(Debug, Clone)]
pub struct BoundedTopK {
    k: usize,
    heap: BinaryHeap<Reverse<Candidate>>,
}

impl BoundedTopK {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Score of the worst kept candidate, once the heap is full.
    pub fn threshold(&self) -> Option<f32> {
        if self.heap.len() < self.k {
            return None;
        }
        self.heap.peek().map(|Reverse(c)| c.score.into_inner())
    }

    /// Offer a candidate. NaN scores are ignored.
    #[inline]
    pub fn offer(&mut self, doc_id: u64, score: f32) {
        if self.k == 0 || score.is_nan() {
            return;
        }
        let candidate = Candidate {
            score: OrderedFloat(score),
            doc_id,
        };
        if self.heap.len() < self.k {
            self.heap.push(Reverse(candidate));
            return;
        }
        if let Some(mut worst) = self.heap.peek_mut() {
            if candidate > worst.0 {
                *worst = Reverse(candidate);
            }
        }
    }

    /// Contents best-first.
    pub fn into_sorted(self) -> Vec<Neighbor> {
        let mut candidates: Vec<Candidate> = self.heap.into_iter().map(|Reverse(c)| c).collect();
        candidates.sort_unstable_by(|a, b| b.cmp(a));
        candidates
            .into_iter()
            .map(|c| Neighbor {
                doc_id: c.doc_id,
                score: c.score.into_inner(),
            })
            .collect()
    }
}
