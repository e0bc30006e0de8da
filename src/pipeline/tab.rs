//! Per-tab download phase.
//!
//! Extracts the resources of one content tab, drops files already on disk,
//! downloads the rest and records the outcome in the ledger.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::download::{BatchReport, DownloadEngine};
use crate::host::{ExtractError, ResourceExtractor, Tab, TabHost, wait_for_title};
use crate::remote::{ExistenceCheck, Ledger, LedgerEntry};
use crate::state::StopFlag;

/// Poll interval of the title wait.
const TITLE_POLL: Duration = Duration::from_millis(200);

/// Options of one tab download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TabOptions {
    /// Close the tab once its files are handled.
    pub close_after: bool,
    /// Record downloads in the ledger.
    pub save: bool,
}

/// What happened to one tab.
#[derive(Debug)]
pub enum TabOutcome {
    /// Files were handed to the download engine.
    Downloaded(BatchReport),
    /// Every file already existed on disk.
    AllPresent,
    /// The page showed a verification challenge; the stop flag was set.
    Blocked,
    /// Extraction failed.
    ExtractionFailed(String),
}

impl TabOutcome {
    /// Stable label for logs and summaries.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Downloaded(_) => "downloaded",
            Self::AllPresent => "all_present",
            Self::Blocked => "blocked",
            Self::ExtractionFailed(_) => "extraction_failed",
        }
    }
}

/// Outcome of one tab.
#[derive(Debug)]
pub struct TabReport {
    /// The tab.
    pub tab: Tab,
    /// What happened.
    pub outcome: TabOutcome,
}

/// Title wait settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleWaitConfig {
    /// Placeholder prefix shown before the title renders.
    pub host_prefix: String,
    /// Bound on the wait.
    pub timeout: Duration,
    /// Poll interval.
    pub poll: Duration,
}

impl Default for TitleWaitConfig {
    fn default() -> Self {
        Self {
            host_prefix: String::new(),
            timeout: Duration::from_secs(5),
            poll: TITLE_POLL,
        }
    }
}

/// Runs the download phase for content tabs.
pub struct TabDownloader {
    tabs: Arc<dyn TabHost>,
    extractor: Arc<dyn ResourceExtractor>,
    existence: Arc<dyn ExistenceCheck>,
    engine: Arc<DownloadEngine>,
    ledger: Arc<dyn Ledger>,
    stop: StopFlag,
    title: TitleWaitConfig,
}

impl std::fmt::Debug for TabDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabDownloader")
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}

impl TabDownloader {
    /// Creates a tab downloader.
    pub fn new(
        tabs: Arc<dyn TabHost>,
        extractor: Arc<dyn ResourceExtractor>,
        existence: Arc<dyn ExistenceCheck>,
        engine: Arc<DownloadEngine>,
        ledger: Arc<dyn Ledger>,
        stop: StopFlag,
    ) -> Self {
        Self {
            tabs,
            extractor,
            existence,
            engine,
            ledger,
            stop,
            title: TitleWaitConfig::default(),
        }
    }

    /// Sets the title wait.
    #[must_use]
    pub fn with_title_wait(mut self, title: TitleWaitConfig) -> Self {
        self.title = title;
        self
    }

    /// Returns the tab host.
    #[must_use]
    pub fn tabs(&self) -> &Arc<dyn TabHost> {
        &self.tabs
    }

    /// Returns the stop flag.
    #[must_use]
    pub fn stop_flag(&self) -> &StopFlag {
        &self.stop
    }

    /// Downloads the resources of one content tab.
    #[instrument(skip(self, tab), fields(tab_id = ?tab.id, url = %tab.url))]
    pub async fn download_tab(&self, tab: &Tab, options: TabOptions) -> TabReport {
        let outcome = self.run(tab, options).await;
        info!(outcome = outcome.label(), "tab finished");
        TabReport {
            tab: tab.clone(),
            outcome,
        }
    }

    async fn run(&self, tab: &Tab, options: TabOptions) -> TabOutcome {
        let title = wait_for_title(
            self.tabs.as_ref(),
            tab,
            &self.title.host_prefix,
            self.title.timeout,
            self.title.poll,
        )
        .await;
        if title.timed_out {
            debug!(elapsed_ms = title.elapsed.as_millis(), "title not rendered, extracting anyway");
        }

        let info = match self.extractor.extract(tab).await {
            Ok(info) => info,
            Err(ExtractError::Blocked { url }) => {
                warn!(url = %url, "verification challenge, stopping run");
                if let Err(error) = self.stop.request_stop().await {
                    warn!(error = %error, "failed to set stop flag");
                }
                return TabOutcome::Blocked;
            }
            Err(error) => {
                warn!(error = %error, "extraction failed");
                return TabOutcome::ExtractionFailed(error.to_string());
            }
        };

        let pending = self.existence.filter_existing(info.files.clone()).await;
        if pending.is_empty() {
            debug!(files = info.files.len(), "nothing left to download");
            if options.close_after {
                self.close(tab).await;
            }
            return TabOutcome::AllPresent;
        }

        let report = self.engine.run_batch(pending).await;

        if options.save {
            for result in &report.completed {
                if let Err(error) = self.ledger.save_file(&result.metadata).await {
                    warn!(error = %error, "ledger file write failed");
                }
            }
            if !report.failed.is_empty() {
                warn!(failed = report.failed.len(), "recording content with failed files");
            }
            if let Some(entry) = LedgerEntry::from_info(&info, &tab.url)
                && let Err(error) = self.ledger.save_one(&entry).await
            {
                warn!(error = %error, "ledger content write failed");
            }
        }

        if options.close_after {
            self.close(tab).await;
        }
        TabOutcome::Downloaded(report)
    }

    /// Closes a tab, logging failures.
    pub async fn close(&self, tab: &Tab) {
        let Some(tab_id) = tab.id else {
            debug!(url = %tab.url, "tab has no id, nothing to close");
            return;
        };
        if let Err(error) = self.tabs.close_tab(tab_id).await {
            warn!(tab_id, error = %error, "failed to close tab");
        }
    }
}
