//! Typed single-retry recovery for failed native downloads.
//!
//! A failed download is classified into a [`Recovery`] based on the
//! content kind and the error:
//!
//! | Kind  | Error                          | Recovery                        |
//! |-------|--------------------------------|---------------------------------|
//! | note  | `Failed("Invalid filename")`   | [`Recovery::SanitizeFilename`]  |
//! | video | `Interrupted`                  | [`Recovery::AlternateSource`]   |
//! | any   | anything else                  | [`Recovery::GiveUp`]            |
//!
//! [`RetryPolicy`] applies the recovery at most once and never waits
//! between attempts.
//!
//! # Example
//!
//! ```
//! use harvester_core::{DownloadError, Recovery, ResourceKind, classify_failure};
//!
//! let error = DownloadError::failed("https://cdn.example.com/a.jpg", "Invalid filename");
//! assert_eq!(classify_failure(ResourceKind::Note, &error), Recovery::SanitizeFilename);
//! assert_eq!(classify_failure(ResourceKind::Video, &error), Recovery::GiveUp);
//! ```

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::driver::{DownloadDriver, DownloadResult};
use super::error::DownloadError;
use super::filename::{safe_file_name, safe_file_name_with_extension};
use crate::descriptor::{ResourceDescriptor, ResourceKind};
use crate::remote::ExistenceCheck;

/// Recovery applied after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Rebuild the save path from sanitized author and file name.
    SanitizeFilename,
    /// Download the first alternate source instead.
    AlternateSource,
    /// Report the failure.
    GiveUp,
}

/// Classifies a failure into its recovery.
#[must_use]
pub fn classify_failure(kind: ResourceKind, error: &DownloadError) -> Recovery {
    match (kind, error) {
        (ResourceKind::Note, e) if e.is_invalid_filename() => Recovery::SanitizeFilename,
        (ResourceKind::Video, DownloadError::Interrupted { .. }) => Recovery::AlternateSource,
        _ => Recovery::GiveUp,
    }
}

/// Outcome of one descriptor after recovery.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// The file was downloaded.
    Downloaded {
        /// Driver result of the successful attempt.
        result: DownloadResult,
        /// Attempts made (1 or 2).
        attempts: u32,
    },
    /// Recovery found the target already present.
    Skipped {
        /// Human-readable reason.
        reason: String,
    },
    /// Download failed and recovery did not help.
    Failed {
        /// Error of the last attempt.
        error: DownloadError,
    },
}

impl RetryOutcome {
    /// Returns true if a retry was attempted.
    #[must_use]
    pub fn retried(&self) -> bool {
        matches!(self, Self::Downloaded { attempts, .. } if *attempts > 1)
    }
}

/// Applies [`Recovery`] after a failed download.
#[derive(Clone)]
pub struct RetryPolicy {
    existence: Arc<dyn ExistenceCheck>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy").finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Creates a policy that re-checks sanitized paths with `existence`.
    pub fn new(existence: Arc<dyn ExistenceCheck>) -> Self {
        Self { existence }
    }

    /// Downloads a descriptor, retrying once when the failure is recoverable.
    ///
    /// Never returns an error: every failure is folded into the outcome.
    #[instrument(skip(self, driver, descriptor), fields(url = %descriptor.url, kind = descriptor.kind.as_str()))]
    pub async fn download_with_retry(
        &self,
        driver: &DownloadDriver,
        descriptor: &ResourceDescriptor,
    ) -> RetryOutcome {
        let error = match driver.download(descriptor).await {
            Ok(result) => return RetryOutcome::Downloaded { result, attempts: 1 },
            Err(error) => error,
        };

        match classify_failure(descriptor.kind, &error) {
            Recovery::SanitizeFilename => self.retry_sanitized(driver, descriptor).await,
            Recovery::AlternateSource => retry_alternate(driver, descriptor, error).await,
            Recovery::GiveUp => {
                debug!(error = %error, "failure not recoverable");
                RetryOutcome::Failed { error }
            }
        }
    }

    async fn retry_sanitized(
        &self,
        driver: &DownloadDriver,
        descriptor: &ResourceDescriptor,
    ) -> RetryOutcome {
        let filename = format!(
            "{}/{}",
            safe_file_name(&descriptor.author_name),
            safe_file_name_with_extension(&descriptor.file_name)
        );
        let renamed = descriptor.renamed(&filename);
        info!(filename = %filename, "retrying with sanitized filename");

        let absent = self.existence.filter_existing(vec![renamed]).await;
        let Some(candidate) = absent.into_iter().next() else {
            return RetryOutcome::Skipped {
                reason: format!("files already exist: {filename}"),
            };
        };

        match driver.download(&candidate).await {
            Ok(result) => RetryOutcome::Downloaded { result, attempts: 2 },
            Err(error) => {
                warn!(error = %error, "sanitized retry failed");
                RetryOutcome::Failed { error }
            }
        }
    }
}

async fn retry_alternate(
    driver: &DownloadDriver,
    descriptor: &ResourceDescriptor,
    error: DownloadError,
) -> RetryOutcome {
    let alternates = &descriptor.alternate_sources;
    let Some(alternate) = alternates.first().filter(|_| alternates.len() > 1) else {
        debug!(alternates = alternates.len(), "no alternate source to retry with");
        return RetryOutcome::Failed { error };
    };

    info!(alternate = %alternate.url, "retrying with alternate source");
    match driver.download(alternate).await {
        Ok(result) => RetryOutcome::Downloaded { result, attempts: 2 },
        Err(error) => {
            warn!(error = %error, "alternate source retry failed");
            RetryOutcome::Failed { error }
        }
    }
}
