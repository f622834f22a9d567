//! Resident set size sampling.

/// Source of RSS samples, in megabytes.
///
/// One sampler is used for a whole run so that every phase boundary is
/// measured the same way.
pub trait RssSampler {
    fn sample_mb(&self) -> f64;
}

/// Reads `VmRSS` from `/proc/self/status`; 0.0 where that is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcRss;

impl RssSampler for ProcRss {
    fn sample_mb(&self) -> f64 {
        get_rss_bytes() as f64 / (1024.0 * 1024.0)
    }
}

/// Current RSS in bytes.
pub fn get_rss_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string("/proc/self/status") {
            Ok(status) => parse_vm_rss_kb(&status).map_or(0, |kb| kb * 1024),
            Err(_) => 0,
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        0
    }
}

/// `VmRSS:   123456 kB` -> 123456
fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse().ok())
}

/// Fixed or scripted samples, for tests and dry runs.
#[derive(Debug, Default)]
pub struct FixedRss {
    samples: std::sync::Mutex<std::collections::VecDeque<f64>>,
    fallback: f64,
}

impl FixedRss {
    pub fn constant(mb: f64) -> Self {
        Self {
            samples: Default::default(),
            fallback: mb,
        }
    }

    /// Yield `samples` in order, then repeat the last one.
    pub fn scripted(samples: impl IntoIterator<Item = f64>) -> Self {
        let samples: std::collections::VecDeque<f64> = samples.into_iter().collect();
        let fallback = samples.back().copied().unwrap_or(0.0);
        Self {
            samples: std::sync::Mutex::new(samples),
            fallback,
        }
    }
}

impl RssSampler for FixedRss {
    fn sample_mb(&self) -> f64 {
        match self.samples.lock() {
            Ok(mut queue) => queue.pop_front().unwrap_or(self.fallback),
            Err(_) => self.fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tbench\nVmPeak:\t  900 kB\nVmRSS:\t  51234 kB\nThreads:\t1\n";
        assert_eq!(parse_vm_rss_kb(status), Some(51234));
        assert_eq!(parse_vm_rss_kb("Name:\tx\n"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_proc_rss_is_positive_on_linux() {
        assert!(ProcRss.sample_mb() > 0.0);
    }

    #[test]
    fn test_scripted_samples() {
        let rss = FixedRss::scripted([1.0, 2.0]);
        assert_eq!(rss.sample_mb(), 1.0);
        assert_eq!(rss.sample_mb(), 2.0);
        assert_eq!(rss.sample_mb(), 2.0);
    }
}
