//! Tracing subscriber initialisation for shardbench binaries.
//!
//! Libraries in this workspace only emit `tracing` events; binaries decide
//! where they go by calling one of the initialisers below once at start-up.
//!
//! # Usage
//!
//! ```no_run
//! use shardbench_core::telemetry;
//!
//! fn main() {
//!     // RUST_LOG=shardbench=debug narrows or widens the default `info` filter
//!     telemetry::init_subscriber().ok();
//!     tracing::info!("Application started");
//! }
//! ```

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Error returned when a global subscriber is already installed.
pub type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Build the filter used by the initialisers.
///
/// `RUST_LOG` wins when it is set and parses; otherwise `default_directive`
/// applies to every target.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a compact stderr subscriber filtered by `RUST_LOG` (default `info`).
///
/// Benchmark output proper goes to stdout, so logs never interleave with the
/// tables a run prints.
pub fn init_subscriber() -> Result<(), InitError> {
    fmt::Subscriber::builder()
        .with_env_filter(env_filter("info"))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
}

/// Install a verbose stderr subscriber for development.
///
/// Same as [`init_subscriber`] but defaults to DEBUG and includes file and
/// line numbers.
pub fn init_dev_subscriber() -> Result<(), InitError> {
    fmt::Subscriber::builder()
        .with_env_filter(env_filter("debug"))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        // Only one global subscriber per process; whichever call loses must
        // report an error instead of aborting the test binary.
        let first = init_subscriber();
        let second = init_dev_subscriber();
        assert!(first.is_err() || second.is_err());
    }

    #[test]
    fn test_env_filter_fallback() {
        let filter = env_filter("warn");
        // Display is the directive list; it must not be empty either way.
        assert!(!filter.to_string().is_empty());
    }
}
