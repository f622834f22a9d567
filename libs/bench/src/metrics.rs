//! Recall and latency metrics.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Latency statistics from a search phase, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Queries per second implied by the mean latency.
    pub qps: f64,
    pub count: usize,
}

impl LatencyStats {
    /// Compute latency statistics from per-query latencies in milliseconds.
    pub fn from_latencies(latencies: &[f64]) -> Self {
        if latencies.is_empty() {
            return Self::default();
        }

        let mut sorted = latencies.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let sum: f64 = sorted.iter().sum();
        let mean_ms = sum / sorted.len() as f64;

        Self {
            mean_ms,
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            qps: if mean_ms > 0.0 { 1000.0 / mean_ms } else { 0.0 },
            count: sorted.len(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "mean={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, QPS={:.1}",
            self.mean_ms, self.p50_ms, self.p95_ms, self.p99_ms, self.qps
        )
    }
}

/// Recall@k of one query.
///
/// `|retrieved[:k] ∩ truth[:k]| / k`. Dividing by `k` rather than by the
/// truth length means a result list shorter than `k` is penalised.
pub fn recall_at_k(retrieved: &[u64], truth: &[u64], k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let relevant: HashSet<u64> = truth.iter().take(k).copied().collect();
    let hits = retrieved
        .iter()
        .take(k)
        .collect::<HashSet<_>>()
        .into_iter()
        .filter(|id| relevant.contains(*id))
        .count();
    hits as f64 / k as f64
}

/// Compute percentile from sorted values.
///
/// # Arguments
///
/// * `sorted_values` - Values sorted in ascending order
/// * `p` - Percentile (0-100)
pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
