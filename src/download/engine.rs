//! Concurrency-limited runner for batches of native downloads.
//!
//! The engine hands each descriptor to the [`RetryPolicy`] on its own Tokio
//! task, with a semaphore bounding how many downloads are active at once.
//! Per-item failures never abort the batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::driver::{DownloadDriver, DownloadResult};
use super::error::DownloadError;
use super::retry::{RetryOutcome, RetryPolicy};
use crate::descriptor::ResourceDescriptor;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default concurrency: one file at a time per tab.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Error type for download engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Cumulative counters across every batch an engine has run.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    retried: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of successfully completed downloads.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of failed downloads.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of descriptors skipped during recovery.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Returns the number of retry attempts that produced a download.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    /// Returns completed + failed + skipped.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed() + self.skipped()
    }

    fn record(&self, outcome: &RetryOutcome) {
        let counter = match outcome {
            RetryOutcome::Downloaded { .. } => &self.completed,
            RetryOutcome::Skipped { .. } => &self.skipped,
            RetryOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        if outcome.retried() {
            self.retried.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Results of one batch, in completion order.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successful downloads.
    pub completed: Vec<DownloadResult>,
    /// Skip reasons from recovery.
    pub skipped: Vec<String>,
    /// Final errors of failed descriptors.
    pub failed: Vec<DownloadError>,
}

impl BatchReport {
    /// Returns the number of descriptors accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed.len() + self.skipped.len() + self.failed.len()
    }

    fn push(&mut self, outcome: RetryOutcome) {
        match outcome {
            RetryOutcome::Downloaded { result, .. } => self.completed.push(result),
            RetryOutcome::Skipped { reason } => self.skipped.push(reason),
            RetryOutcome::Failed { error } => self.failed.push(error),
        }
    }
}

/// Runs descriptors through the retry policy under a concurrency limit.
///
/// # Concurrency Model
///
/// - Each descriptor runs in its own Tokio task
/// - A semaphore permit is acquired before spawning, released on drop
/// - Completion order is not guaranteed
#[derive(Debug)]
pub struct DownloadEngine {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    driver: Arc<DownloadDriver>,
    retry_policy: Arc<RetryPolicy>,
    stats: Arc<DownloadStats>,
}

impl DownloadEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-100).
    #[instrument(level = "debug", skip(driver, retry_policy))]
    pub fn new(
        concurrency: usize,
        driver: Arc<DownloadDriver>,
        retry_policy: Arc<RetryPolicy>,
    ) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(concurrency, "creating download engine");

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            driver,
            retry_policy,
            stats: Arc::new(DownloadStats::new()),
        })
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the cumulative counters.
    #[must_use]
    pub fn stats(&self) -> &DownloadStats {
        &self.stats
    }

    /// Downloads every descriptor and collects the outcomes.
    #[instrument(skip(self, descriptors), fields(count = descriptors.len()))]
    pub async fn run_batch(&self, descriptors: Vec<ResourceDescriptor>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut handles = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            // The engine owns the semaphore and never closes it.
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                warn!("download semaphore closed");
                break;
            };

            let driver = Arc::clone(&self.driver);
            let retry_policy = Arc::clone(&self.retry_policy);
            let stats = Arc::clone(&self.stats);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = retry_policy.download_with_retry(&driver, &descriptor).await;
                stats.record(&outcome);
                outcome
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(outcome) => report.push(outcome),
                Err(e) => warn!(error = %e, "download task panicked"),
            }
        }

        info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "batch complete"
        );
        report
    }
}
