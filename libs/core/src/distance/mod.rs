//! Vector kernels used by the corpus scanners and the reference index backends.
//!
//! Everything here operates on plain `&[f32]` slices so callers can pass rows
//! straight out of a memory-mapped shard without copying.
//!
//! ## Usage
//!
//! ```rust
//! use shardbench_core::distance::{cosine_similarity, dot, euclidean_squared};
//!
//! let a = vec![1.0, 2.0, 3.0, 4.0];
//! let b = vec![5.0, 6.0, 7.0, 8.0];
//!
//! let d = euclidean_squared(&a, &b);
//! let c = cosine_similarity(&a, &b);
//! let p = dot(&a, &b);
//! assert!(d > 0.0 && c > 0.0 && p > 0.0);
//! ```
//!
//! ## Score blocks
//!
//! [`dot_block`] computes a whole `rows x queries` score matrix in one call.
//! The ground-truth scan uses it once per streamed chunk, which keeps the inner
//! loops tight enough for the compiler to auto-vectorise.

pub mod scalar;

#[cfg(test)]
mod tests;

pub use scalar::{dot, euclidean_squared, norm};

/// Cosine similarity in `[-1, 1]`.
///
/// Zero vectors have similarity `0.0` with everything.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = scalar::dot_and_norms(a, b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Scale `v` to unit length in place and return its original norm.
///
/// Vectors with a norm below `1e-12` are left untouched.
pub fn normalize(v: &mut [f32]) -> f32 {
    let n = norm(v);
    if n > 1e-12 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
    n
}

/// Batched dot products between two row-major matrices.
///
/// `rows` holds `rows.len() / dim` vectors, `queries` holds
/// `queries.len() / dim` vectors. `out` receives the score matrix in row-major
/// order: `out[r * num_queries + q] = dot(rows[r], queries[q])`.
///
/// # Panics
///
/// Panics if `dim` is zero, if either input is not a whole number of rows, or
/// if `out` has the wrong length. These are programming errors in the caller.
pub fn dot_block(rows: &[f32], queries: &[f32], dim: usize, out: &mut [f32]) {
    assert!(dim > 0, "dim must be non-zero");
    assert_eq!(rows.len() % dim, 0, "rows is not a whole number of vectors");
    assert_eq!(queries.len() % dim, 0, "queries is not a whole number of vectors");

    let num_rows = rows.len() / dim;
    let num_queries = queries.len() / dim;
    assert_eq!(out.len(), num_rows * num_queries, "score buffer has wrong length");

    for (row, scores) in rows.chunks_exact(dim).zip(out.chunks_exact_mut(num_queries.max(1))) {
        for (query, score) in queries.chunks_exact(dim).zip(scores.iter_mut()) {
            *score = scalar::dot(row, query);
        }
    }
}

/// Norm of every row of a row-major matrix.
pub fn row_norms(rows: &[f32], dim: usize) -> Vec<f32> {
    rows.chunks_exact(dim).map(norm).collect()
}
