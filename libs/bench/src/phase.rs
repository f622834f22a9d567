//! Timed, RSS-sampled benchmark phases.

use std::time::Instant;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::rss::RssSampler;

/// Phase-specific fields (`rows`, `recall_mean`, ...), in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseDetails(IndexMap<String, Value>);

impl PhaseDetails {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One executed phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    #[serde(skip)]
    pub name: String,
    pub time_sec: f64,
    pub rss_before_mb: f64,
    pub rss_after_mb: f64,
    pub rss_delta_mb: f64,
    #[serde(flatten)]
    pub details: PhaseDetails,
}

/// Runs phase bodies and records them in execution order.
///
/// RSS is sampled once per boundary: each phase's `rss_before_mb` is the
/// sample taken when the previous phase ended.
pub struct PhaseClock<'a> {
    sampler: &'a dyn RssSampler,
    last_rss_mb: f64,
    records: Vec<PhaseRecord>,
}

impl<'a> PhaseClock<'a> {
    pub fn new(sampler: &'a dyn RssSampler) -> Self {
        let last_rss_mb = sampler.sample_mb();
        Self {
            sampler,
            last_rss_mb,
            records: Vec::new(),
        }
    }

    /// Time `body`. The phase is recorded whether or not it fails; a failed
    /// phase carries an `error` detail.
    pub fn run<T, F>(&mut self, name: &str, body: F) -> Result<T>
    where
        F: FnOnce(&mut PhaseDetails) -> Result<T>,
    {
        let mut details = PhaseDetails::default();
        let rss_before_mb = self.last_rss_mb;
        let start = Instant::now();
        let result = body(&mut details);
        let time_sec = start.elapsed().as_secs_f64();
        let rss_after_mb = self.sampler.sample_mb();
        self.last_rss_mb = rss_after_mb;

        if let Err(e) = &result {
            details.insert("error", e.to_string());
        }
        tracing::info!(
            phase = name,
            time_sec,
            rss_before_mb,
            rss_after_mb,
            ok = result.is_ok(),
            "[phase] {} done",
            name
        );
        self.records.push(PhaseRecord {
            name: name.to_string(),
            time_sec,
            rss_before_mb,
            rss_after_mb,
            rss_delta_mb: rss_after_mb - rss_before_mb,
            details,
        });
        result
    }

    pub fn records(&self) -> &[PhaseRecord] {
        &self.records
    }
}
