//! Harvester Core Library
//!
//! Download orchestration for a video-sharing site's listing pages. The
//! library discovers content links on an infinite-scroll listing, filters
//! content already recorded in a remote ledger, opens content tabs under a
//! bounded prefetch window, extracts downloadable resources per tab and
//! drives the host browser's native download manager.
//!
//! # Architecture
//!
//! - [`host`] - Capability traits for the host browser (downloads, tabs, listing pages, extraction)
//! - [`descriptor`] - Resource descriptors and content ids
//! - [`download`] - Download driver, retry policy and concurrency-limited engine
//! - [`remote`] - Ledger and existence-check HTTP services
//! - [`discovery`] - Listing link discovery loop
//! - [`pipeline`] - Per-tab download phase, tab batches and the prefetch pipeline
//! - [`orchestrator`] - User commands tying everything together
//! - [`state`] - Persisted run state (stop flag, toggles, allow-lists)
//! - [`config`] - File configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod descriptor;
pub mod discovery;
pub mod download;
pub mod host;
pub mod orchestrator;
pub mod pipeline;
pub mod remote;
pub mod state;
pub mod style;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, HarvestConfig};
pub use db::{Database, DbError};
pub use descriptor::{ContentId, ResourceDescriptor, ResourceInfo, ResourceKind};
pub use discovery::{DiscoveryConfig, DiscoveryReport, LinkDiscovery, LinkSet, StopReason};
pub use download::{
    BatchReport, DownloadDriver, DownloadEngine, DownloadError, DownloadMetadata, DownloadResult,
    DownloadStats, DownloadTask, EngineError, Recovery, RetryOutcome, RetryPolicy, TaskState,
    classify_failure,
};
pub use host::{
    DownloadDelta, DownloadHost, DownloadId, DownloadRequest, ExtractError, HostError,
    ListingPage, ListingSnapshot, LogNotifier, NativeState, Notifier, ResourceExtractor, Tab,
    TabHost, TabId,
};
pub use orchestrator::{
    Command, CommandOptions, CommandReport, ListingReport, Orchestrator, OrchestratorError,
};
pub use pipeline::{
    MissingFilter, PrefetchConfig, PrefetchPipeline, PrefetchReport, TabDownloader, TabOptions,
    TabOutcome, TabReport,
};
pub use remote::{ExistenceCheck, ExistenceFilter, Ledger, LedgerClient, LedgerError, RemoteError};
pub use state::{RunSettings, RunState, StateError, StateKey, StateStore, StopFlag};
