//! File naming conventions of a sharded dataset directory.
//!
//! ```text
//! <prefix>-<label>.meta.json        {"dim": 1024, "dtype": "float32", ...}
//! <prefix>-<label>.gt.jsonl         one ground-truth entry per line
//! <prefix>-<label>.shard0000.f32    raw little-endian f32 rows, no header
//! <prefix>-<label>.shard0001.f32
//! ```

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default file prefix, matching the MSMARCO shard converter output.
pub const DEFAULT_PREFIX: &str = "msmarco-passages";

const META_SUFFIX: &str = ".meta.json";
const GT_SUFFIX: &str = ".gt.jsonl";
const SHARD_MARKER: &str = ".shard";
const SHARD_SUFFIX: &str = ".f32";

/// Naming convention for one family of dataset files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetLayout {
    pub prefix: String,
}

impl Default for DatasetLayout {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl DatasetLayout {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn meta_file_name(&self, label: &str) -> String {
        format!("{}-{}{}", self.prefix, label, META_SUFFIX)
    }

    pub fn ground_truth_file_name(&self, label: &str) -> String {
        format!("{}-{}{}", self.prefix, label, GT_SUFFIX)
    }

    pub fn shard_file_name(&self, label: &str, index: usize) -> String {
        format!("{}-{}{}{:04}{}", self.prefix, label, SHARD_MARKER, index, SHARD_SUFFIX)
    }

    pub fn meta_path(&self, dir: &Path, label: &str) -> PathBuf {
        dir.join(self.meta_file_name(label))
    }

    pub fn ground_truth_path(&self, dir: &Path, label: &str) -> PathBuf {
        dir.join(self.ground_truth_file_name(label))
    }

    pub fn shard_path(&self, dir: &Path, label: &str, index: usize) -> PathBuf {
        dir.join(self.shard_file_name(label, index))
    }

    /// Label of a metadata sidecar name, if it follows this layout.
    pub fn meta_label<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        self.label_with_suffix(file_name, META_SUFFIX)
    }

    /// Label of a ground-truth sidecar name, if it follows this layout.
    pub fn ground_truth_label<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        self.label_with_suffix(file_name, GT_SUFFIX)
    }

    /// `(label, shard_index)` of a shard file name.
    ///
    /// The index is parsed numerically, so `shard10` sorts after `shard2`
    /// regardless of zero padding.
    pub fn parse_shard<'a>(&self, file_name: &'a str) -> Option<(&'a str, usize)> {
        let rest = self.strip_prefix(file_name)?;
        let rest = rest.strip_suffix(SHARD_SUFFIX)?;
        let marker = rest.rfind(SHARD_MARKER)?;
        let label = &rest[..marker];
        let digits = &rest[marker + SHARD_MARKER.len()..];
        if label.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index = digits.parse().ok()?;
        Some((label, index))
    }

    fn strip_prefix<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name.strip_prefix(self.prefix.as_str())?.strip_prefix('-')
    }

    fn label_with_suffix<'a>(&self, file_name: &'a str, suffix: &str) -> Option<&'a str> {
        let label = self.strip_prefix(file_name)?.strip_suffix(suffix)?;
        if label.is_empty() {
            None
        } else {
            Some(label)
        }
    }
}

/// Ordering used to pick the "newest" sidecar among several labels.
///
/// Numeric labels sort first by value, other labels after them
/// lexicographically; the greatest label wins.
pub fn compare_labels(a: &str, b: &str) -> Ordering {
    let numeric = |s: &str| -> Option<u128> {
        let digits: String = s.chars().filter(|c| *c != '_').collect();
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            digits.parse().ok()
        } else {
            None
        }
    };
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let layout = DatasetLayout::default();
        assert_eq!(layout.meta_file_name("1000"), "msmarco-passages-1000.meta.json");
        assert_eq!(layout.ground_truth_file_name("1000"), "msmarco-passages-1000.gt.jsonl");
        assert_eq!(layout.shard_file_name("1000", 7), "msmarco-passages-1000.shard0007.f32");
    }

    #[test]
    fn test_parse_shard_numeric_index() {
        let layout = DatasetLayout::default();
        assert_eq!(
            layout.parse_shard("msmarco-passages-10M.shard0012.f32"),
            Some(("10M", 12))
        );
        assert_eq!(layout.parse_shard("msmarco-passages-x.shard10.f32"), Some(("x", 10)));
        assert_eq!(layout.parse_shard("msmarco-passages-x.shard.f32"), None);
        assert_eq!(layout.parse_shard("msmarco-passages-x.shard1a.f32"), None);
        assert_eq!(layout.parse_shard("other-x.shard0001.f32"), None);
        assert_eq!(layout.parse_shard("msmarco-passages-x.meta.json"), None);
    }

    #[test]
    fn test_labels() {
        let layout = DatasetLayout::new("corpus");
        assert_eq!(layout.meta_label("corpus-5.meta.json"), Some("5"));
        assert_eq!(layout.ground_truth_label("corpus-5.gt.jsonl"), Some("5"));
        assert_eq!(layout.meta_label("corpus-.meta.json"), None);
        assert_eq!(layout.meta_label("corpus5.meta.json"), None);
    }

    #[test]
    fn test_compare_labels() {
        assert_eq!(compare_labels("2", "10"), Ordering::Less);
        assert_eq!(compare_labels("1_000_000", "999"), Ordering::Greater);
        assert_eq!(compare_labels("10", "abc"), Ordering::Less);
        assert_eq!(compare_labels("abc", "abd"), Ordering::Less);
    }
}
