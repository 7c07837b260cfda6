//! # Utility Modules
//!
//! Supporting utilities for compression, logging and metrics.
//!
//! ## Components
//! - **Compression**: zlib, LZ4 and Zstd with output size limits
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe server counters

pub mod compression;
pub mod logging;
pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
