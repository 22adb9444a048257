//! # Utility Modules
//!
//! Supporting utilities for compression and observability.
//!
//! ## Components
//! - **Compression**: LZ4 and Zstd block modes keyed by the frame header's
//!   raw-length field
//! - **Metrics**: Thread-safe protocol counters

pub mod compression;
pub mod metrics;

pub use compression::CompressionKind;
pub use metrics::{global_metrics, Metrics, MetricsSnapshot};
