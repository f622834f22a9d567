//! Kernel tests: block scoring against pairwise kernels plus numeric edge cases.

use super::{cosine_similarity, dot, dot_block, euclidean_squared, normalize, row_norms};

fn approx_eq(a: f32, b: f32, epsilon: f32) -> bool {
    (a - b).abs() < epsilon
}

/// Generate deterministic test vectors
fn make_rows(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    // Simple LCG for deterministic pseudo-random values
    let mut state = seed;
    (0..n * dim)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state as f32 / u64::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

#[test]
fn test_dot_block_matches_pairwise() {
    for &dim in &[1usize, 3, 8, 17, 64] {
        let rows = make_rows(7, dim, 1);
        let queries = make_rows(5, dim, 2);
        let mut out = vec![0.0f32; 7 * 5];

        dot_block(&rows, &queries, dim, &mut out);

        for r in 0..7 {
            for q in 0..5 {
                let expected = dot(&rows[r * dim..(r + 1) * dim], &queries[q * dim..(q + 1) * dim]);
                assert!(
                    approx_eq(out[r * 5 + q], expected, 1e-5),
                    "dim={} r={} q={}",
                    dim,
                    r,
                    q
                );
            }
        }
    }
}

#[test]
fn test_dot_block_empty_inputs() {
    let mut out: Vec<f32> = Vec::new();
    dot_block(&[], &[1.0, 2.0], 2, &mut out);
    dot_block(&[1.0, 2.0], &[], 2, &mut out);
    assert!(out.is_empty());
}

#[test]
#[should_panic]
fn test_dot_block_wrong_output_len() {
    let mut out = vec![0.0f32; 3];
    dot_block(&[1.0, 2.0], &[1.0, 2.0], 2, &mut out);
}

#[test]
fn test_cosine_similarity_parallel_and_opposite() {
    assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]), 1.0, 1e-6));
    assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]), -1.0, 1e-6));
    assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[0.0, 5.0]), 0.0, 1e-6));
}

#[test]
fn test_cosine_similarity_zero_vector() {
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
}

#[test]
fn test_normalize() {
    let mut v = vec![3.0, 4.0];
    let n = normalize(&mut v);
    assert!(approx_eq(n, 5.0, 1e-6));
    assert!(approx_eq(v[0], 0.6, 1e-6));
    assert!(approx_eq(v[1], 0.8, 1e-6));

    let mut zero = vec![0.0, 0.0];
    assert_eq!(normalize(&mut zero), 0.0);
    assert_eq!(zero, vec![0.0, 0.0]);
}

#[test]
fn test_row_norms() {
    let norms = row_norms(&[3.0, 4.0, 0.0, 2.0], 2);
    assert_eq!(norms.len(), 2);
    assert!(approx_eq(norms[0], 5.0, 1e-6));
    assert!(approx_eq(norms[1], 2.0, 1e-6));
}

#[test]
fn test_euclidean_symmetry() {
    let rows = make_rows(2, 33, 9);
    let (a, b) = rows.split_at(33);
    assert!(approx_eq(euclidean_squared(a, b), euclidean_squared(b, a), 1e-6));
    assert!(approx_eq(euclidean_squared(a, a), 0.0, 1e-6));
}
