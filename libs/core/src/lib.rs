//! Shared building blocks for the shardbench workspace.
//!
//! - [`distance`] - portable vector kernels (dot, norms, batched score blocks)
//! - [`telemetry`] - tracing subscriber initialisation for binaries

pub mod distance;
pub mod telemetry;
