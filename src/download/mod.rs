//! Native download orchestration.
//!
//! This module drives the host browser's download manager one file at a
//! time and layers recovery and concurrency on top.
//!
//! # Layers
//!
//! - [`DownloadDriver`] - one awaitable call per native download, resolved from change events
//! - [`RetryPolicy`] - typed single retry (sanitized filename, alternate source)
//! - [`DownloadEngine`] - semaphore-bounded batch runner with cumulative stats

mod driver;
mod engine;
mod error;
pub mod filename;
mod retry;

pub use driver::{
    DownloadDriver, DownloadMetadata, DownloadResult, DownloadTask, PlatformMetadata, TaskState,
};
pub use engine::{BatchReport, DEFAULT_CONCURRENCY, DownloadEngine, DownloadStats, EngineError};
pub use error::{DownloadError, INVALID_FILENAME};
pub use retry::{Recovery, RetryOutcome, RetryPolicy, classify_failure};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
