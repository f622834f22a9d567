//! Results documents and run summaries.
//!
//! Every benchmark run writes `results.json` (the [`ResultsDocument`]) and a
//! Markdown rendering `results.md` into its run directory. [`summarize`]
//! collects the documents under a sweep root into one table.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use walkdir::WalkDir;

use crate::catalog::ShardCatalog;
use crate::error::{Error, Result};
use crate::phase::{PhaseDetails, PhaseRecord};
use crate::writer::{write_atomic, write_json_atomic};

pub const RESULTS_JSON: &str = "results.json";
pub const RESULTS_MD: &str = "results.md";

/// Search phases that are scored.
pub const SEARCH_PHASES: [&str; 2] = ["search", "search_after_reopen"];

const INGEST_PHASES: [&str; 2] = ["ingest_initial", "ingest_remaining"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub label: String,
    pub dim: usize,
    pub shards: usize,
    pub rows: u64,
}

impl DatasetInfo {
    pub fn from_catalog(catalog: &ShardCatalog) -> Self {
        Self {
            label: catalog.label.clone(),
            dim: catalog.dim,
            shards: catalog.num_shards(),
            rows: catalog.total_rows(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecallSummary {
    pub mean: Option<f64>,
    pub n: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub mean: Option<f64>,
    pub p95: Option<f64>,
}

/// Self-contained record of one run, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    pub dataset: DatasetInfo,
    pub config: IndexMap<String, Value>,
    pub phases: IndexMap<String, PhaseRecord>,
    pub recall: IndexMap<String, RecallSummary>,
    pub latency_ms: IndexMap<String, LatencySummary>,
    pub backend: String,
    pub db_path: PathBuf,
    pub db_size_mb: f64,
    pub peak_rss_mb: f64,
    pub total_time_sec: f64,
    #[serde(default)]
    pub error: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl ResultsDocument {
    /// Assemble the document from executed phases, in execution order.
    ///
    /// A derived `ingest` entry summarising the ingest sub-phases is inserted
    /// after the last of them. Peak RSS and total time only consider executed
    /// phases.
    pub fn from_phases(
        dataset: DatasetInfo,
        config: IndexMap<String, Value>,
        backend: impl Into<String>,
        records: &[PhaseRecord],
        db_path: PathBuf,
        db_size_mb: f64,
        error: Option<String>,
    ) -> Self {
        let peak_rss_mb = records.iter().map(|r| r.rss_after_mb).fold(0.0, f64::max);
        let total_time_sec = records.iter().map(|r| r.time_sec).sum();

        let last_ingest = records
            .iter()
            .rposition(|r| INGEST_PHASES.contains(&r.name.as_str()));
        let mut phases = IndexMap::new();
        for (i, record) in records.iter().enumerate() {
            phases.insert(record.name.clone(), record.clone());
            if Some(i) == last_ingest {
                let batch_size = config.get("batch_size").cloned().unwrap_or(Value::Null);
                phases.insert("ingest".to_string(), derive_ingest(records, batch_size));
            }
        }

        let mut recall = IndexMap::new();
        let mut latency_ms = IndexMap::new();
        for name in SEARCH_PHASES {
            let details = phases.get(name).map(|p: &PhaseRecord| &p.details);
            recall.insert(
                name.to_string(),
                RecallSummary {
                    mean: details.and_then(|d| d.get_f64("recall_mean")),
                    n: details.and_then(|d| d.get_u64("recall_count")),
                },
            );
            latency_ms.insert(
                name.to_string(),
                LatencySummary {
                    mean: details.and_then(|d| d.get_f64("latency_ms_mean")),
                    p95: details.and_then(|d| d.get_f64("latency_ms_p95")),
                },
            );
        }

        Self {
            dataset,
            config,
            phases,
            recall,
            latency_ms,
            backend: backend.into(),
            db_path,
            db_size_mb,
            peak_rss_mb,
            total_time_sec,
            error,
            generated_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Recall after reopen, falling back to the first search.
    pub fn final_recall(&self) -> Option<f64> {
        SEARCH_PHASES
            .iter()
            .rev()
            .find_map(|name| self.recall.get(*name).and_then(|r| r.mean))
    }

    pub fn final_latency_ms(&self) -> Option<f64> {
        SEARCH_PHASES
            .iter()
            .rev()
            .find_map(|name| self.latency_ms.get(*name).and_then(|l| l.mean))
    }

    fn k(&self) -> String {
        self.config
            .get("k")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "k".to_string())
    }

    /// Write `results.json` and `results.md` into `dir`.
    pub fn write(&self, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let json_path = dir.join(RESULTS_JSON);
        write_json_atomic(&json_path, self)?;
        let md_path = dir.join(RESULTS_MD);
        write_atomic(&md_path, self.render_markdown().as_bytes())?;
        Ok((json_path, md_path))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut doc: Self = serde_json::from_str(&content)?;
        for (name, record) in doc.phases.iter_mut() {
            record.name = name.clone();
        }
        Ok(doc)
    }

    pub fn render_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# {} benchmark ({})", self.backend, self.dataset.label);
        let _ = writeln!(md);
        if let Some(error) = &self.error {
            let _ = writeln!(md, "**Run failed:** {}", error);
            let _ = writeln!(md);
        }

        let _ = writeln!(md, "## Dataset");
        let _ = writeln!(md, "- label: {}", self.dataset.label);
        let _ = writeln!(md, "- dim: {}", self.dataset.dim);
        let _ = writeln!(md, "- shards: {}", self.dataset.shards);
        let _ = writeln!(md, "- rows: {}", self.dataset.rows);
        let _ = writeln!(md);

        let _ = writeln!(md, "## Config");
        for (key, value) in &self.config {
            let _ = writeln!(md, "- {}: {}", key, display_value(value));
        }
        let _ = writeln!(md);

        let _ = writeln!(md, "## Phases (time sec / RSS MB)");
        let k = self.k();
        for (name, p) in &self.phases {
            let _ = write!(
                md,
                "- {}: time={:.3}s, rss_before={:.1} MB, rss_after={:.1} MB, delta={:.1} MB",
                name, p.time_sec, p.rss_before_mb, p.rss_after_mb, p.rss_delta_mb
            );
            if let Some(recall) = p.details.get_f64("recall_mean") {
                let _ = write!(md, ", recall@{}={:.4}", k, recall);
            }
            if let Some(latency) = p.details.get_f64("latency_ms_mean") {
                let _ = write!(md, ", latency_ms={:.2}", latency);
            }
            let _ = writeln!(md);
        }
        let _ = writeln!(md);

        let _ = writeln!(md, "## Recall");
        for (name, r) in &self.recall {
            match (r.mean, r.n) {
                (Some(mean), Some(n)) => {
                    let _ = writeln!(md, "- {}: {:.4} (n={})", name, mean, n);
                }
                _ => {
                    let _ = writeln!(md, "- {}: n/a", name);
                }
            }
        }
        let _ = writeln!(md);

        let _ = writeln!(md, "## Latency (ms)");
        for (name, l) in &self.latency_ms {
            match (l.mean, l.p95) {
                (Some(mean), Some(p95)) => {
                    let _ = writeln!(md, "- {} mean: {:.2} | p95: {:.2}", name, mean, p95);
                }
                _ => {
                    let _ = writeln!(md, "- {}: n/a", name);
                }
            }
        }
        let _ = writeln!(md);

        let _ = writeln!(md, "- db_path: {}", self.db_path.display());
        let _ = writeln!(md, "- db_size_mb: {:.1}", self.db_size_mb);
        let _ = writeln!(md, "- peak_rss_mb: {:.1}", self.peak_rss_mb);
        let _ = writeln!(md, "- total_time: {}", format_duration(self.total_time_sec));
        let _ = writeln!(md, "- generated_at: {}", self.generated_at.to_rfc3339());
        md
    }
}

fn derive_ingest(records: &[PhaseRecord], batch_size: Value) -> PhaseRecord {
    let parts: Vec<&PhaseRecord> = records
        .iter()
        .filter(|r| INGEST_PHASES.contains(&r.name.as_str()))
        .collect();
    let rss_before_mb = parts.first().map_or(0.0, |r| r.rss_before_mb);
    let rss_after_mb = parts.last().map_or(0.0, |r| r.rss_after_mb);
    let rows: u64 = parts.iter().filter_map(|r| r.details.get_u64("rows")).sum();
    let batches: u64 = parts.iter().filter_map(|r| r.details.get_u64("batches")).sum();

    let mut details = PhaseDetails::default();
    details.insert("rows", rows);
    details.insert("batches", batches);
    details.insert("batch_size", batch_size);
    PhaseRecord {
        name: "ingest".to_string(),
        time_sec: parts.iter().map(|r| r.time_sec).sum(),
        rss_before_mb,
        rss_after_mb,
        rss_delta_mb: rss_after_mb - rss_before_mb,
        details,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// `42.000s`, `3m 5.250s`, `1h 2m 3.000s`
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{:.3}s", seconds);
    }
    let minutes = (seconds / 60.0).floor();
    let secs = seconds - minutes * 60.0;
    if minutes < 60.0 {
        return format!("{}m {:.3}s", minutes as u64, secs);
    }
    let hours = (minutes / 60.0).floor();
    format!("{}h {}m {:.3}s", hours as u64, (minutes - hours * 60.0) as u64, secs)
}

/// Total size of the files under `path` in MiB; 0.0 if it does not exist.
pub fn dir_size_mb(path: &Path) -> f64 {
    if !path.exists() {
        return 0.0;
    }
    let bytes: u64 = WalkDir::new(path)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|m| m.len())
        .sum();
    bytes as f64 / (1024.0 * 1024.0)
}

/// One row of a sweep summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub run: String,
    pub backend: String,
    pub label: String,
    pub recall: Option<f64>,
    pub latency_ms: Option<f64>,
    pub ingest_sec: Option<f64>,
    pub build_sec: Option<f64>,
    pub peak_rss_mb: f64,
    pub db_size_mb: f64,
    pub total_time_sec: f64,
    pub error: Option<String>,
}

impl SummaryRow {
    pub fn from_document(run: String, doc: &ResultsDocument) -> Self {
        let time = |name: &str| doc.phases.get(name).map(|p| p.time_sec);
        let build_sec = match (time("create_index"), time("build_index_now")) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        };
        Self {
            run,
            backend: doc.backend.clone(),
            label: doc.dataset.label.clone(),
            recall: doc.final_recall(),
            latency_ms: doc.final_latency_ms(),
            ingest_sec: time("ingest"),
            build_sec,
            peak_rss_mb: doc.peak_rss_mb,
            db_size_mb: doc.db_size_mb,
            total_time_sec: doc.total_time_sec,
            error: doc.error.clone(),
        }
    }
}

/// Load every `<root>/*/results.json`, best recall first, then lowest
/// latency. Unreadable documents are skipped with a warning.
pub fn summarize(root: &Path) -> Result<Vec<SummaryRow>> {
    if !root.is_dir() {
        return Err(Error::InvalidArgument(format!("{} is not a directory", root.display())));
    }
    let mut rows = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).max_depth(2).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if entry.file_name() != RESULTS_JSON {
            continue;
        }
        let run = entry
            .path()
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match ResultsDocument::load(entry.path()) {
            Ok(doc) => rows.push(SummaryRow::from_document(run, &doc)),
            Err(e) => tracing::warn!(path = %entry.path().display(), error = %e, "skipping results"),
        }
    }
    rows.sort_by(|a, b| {
        let recall_a = a.recall.unwrap_or(f64::NEG_INFINITY);
        let recall_b = b.recall.unwrap_or(f64::NEG_INFINITY);
        let latency_a = a.latency_ms.unwrap_or(f64::INFINITY);
        let latency_b = b.latency_ms.unwrap_or(f64::INFINITY);
        recall_b
            .total_cmp(&recall_a)
            .then(latency_a.total_cmp(&latency_b))
    });
    Ok(rows)
}

/// Markdown table of summary rows.
pub fn render_summary(rows: &[SummaryRow]) -> String {
    let opt = |v: Option<f64>, precision: usize| match v {
        Some(v) => format!("{:.*}", precision, v),
        None => "-".to_string(),
    };
    let mut md = String::new();
    let _ = writeln!(
        md,
        "| run | backend | label | recall | latency_ms | ingest | build | peak_rss_mb | db_size_mb | total | status |"
    );
    let _ = writeln!(md, "|---|---|---|---|---|---|---|---|---|---|---|");
    for r in rows {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | {} | {:.1} | {:.1} | {} | {} |",
            r.run,
            r.backend,
            r.label,
            opt(r.recall, 4),
            opt(r.latency_ms, 2),
            r.ingest_sec.map(format_duration).unwrap_or_else(|| "-".into()),
            r.build_sec.map(format_duration).unwrap_or_else(|| "-".into()),
            r.peak_rss_mb,
            r.db_size_mb,
            format_duration(r.total_time_sec),
            if r.error.is_some() { "failed" } else { "ok" },
        );
    }
    md
}
