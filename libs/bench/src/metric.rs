//! Similarity metrics.
//!
//! Every metric is expressed as a *score* where higher means more similar, so
//! a single max-oriented top-k structure serves all of them. Euclidean
//! distance is negated (and left squared, which preserves the ordering).

use serde::{Deserialize, Serialize};
use shardbench_core::distance;

/// Similarity metric used to rank neighbours.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity in `[-1, 1]`.
    #[default]
    Cosine,

    /// Raw inner product.
    Dot,

    /// Negative squared Euclidean distance.
    L2,
}

impl Metric {
    /// Score between two vectors, higher is better.
    #[inline]
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => distance::cosine_similarity(a, b),
            Metric::Dot => distance::dot(a, b),
            Metric::L2 => -distance::euclidean_squared(a, b),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Dot => "dot",
            Metric::L2 => "l2",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" | "cos" => Ok(Metric::Cosine),
            "dot" | "dotproduct" | "dot_product" | "inner" | "ip" => Ok(Metric::Dot),
            "l2" | "euclidean" | "euclid" => Ok(Metric::L2),
            _ => Err(format!("Unknown metric: {}", s)),
        }
    }
}

/// Query matrix prepared for batched scoring against streamed row blocks.
///
/// Cosine queries are normalised once up front; each row block then only needs
/// its own norms, so a whole chunk is scored with one [`distance::dot_block`]
/// call plus a cheap fix-up pass. L2 is scored pairwise with
/// [`distance::euclidean_squared`], never through the norm expansion, so rows
/// far from the origin still rank exactly.
#[derive(Debug, Clone)]
pub struct PreparedQueries {
    metric: Metric,
    dim: usize,
    data: Vec<f32>,
}

impl PreparedQueries {
    pub fn new(metric: Metric, queries: &[f32], dim: usize) -> Self {
        let mut data = queries.to_vec();
        if metric == Metric::Cosine {
            for q in data.chunks_exact_mut(dim) {
                distance::normalize(q);
            }
        }
        Self { metric, dim, data }
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Score every row of `rows` against every query.
    ///
    /// `out` is resized to `num_rows * num_queries` and filled row-major.
    pub fn score_block(&self, rows: &[f32], out: &mut Vec<f32>) {
        let num_rows = rows.len() / self.dim;
        let num_queries = self.len();
        out.clear();
        out.resize(num_rows * num_queries, 0.0);
        if num_rows == 0 || num_queries == 0 {
            return;
        }

        if self.metric == Metric::L2 {
            for (row, scores) in rows.chunks_exact(self.dim).zip(out.chunks_exact_mut(num_queries)) {
                for (s, q) in scores.iter_mut().zip(self.data.chunks_exact(self.dim)) {
                    *s = -distance::euclidean_squared(row, q);
                }
            }
            return;
        }

        distance::dot_block(rows, &self.data, self.dim, out);

        match self.metric {
            Metric::Dot | Metric::L2 => {}
            Metric::Cosine => {
                for (row, scores) in rows.chunks_exact(self.dim).zip(out.chunks_exact_mut(num_queries)) {
                    let n = distance::norm(row);
                    if n == 0.0 {
                        scores.iter_mut().for_each(|s| *s = 0.0);
                    } else {
                        scores.iter_mut().for_each(|s| *s /= n);
                    }
                }
            }
        }
    }
}
