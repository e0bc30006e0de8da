//! Prefetch pipeline: opens content tabs ahead of the download phase.
//!
//! Two queues drive the loop: links not yet opened and tabs opened but not
//! yet downloaded. Each iteration polls the stop flag, tops the opened
//! queue up to the prefetch window by opening background tabs one at a
//! time, then downloads one opened tab (links remain) or all of them (none
//! remain).

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::batch::{DEFAULT_TAB_CONCURRENCY, download_tabs};
use super::tab::{TabDownloader, TabOptions, TabReport};
use crate::descriptor::ContentId;
use crate::host::Tab;

/// Which links are worth opening, by content id.
///
/// Links without a derivable content id always pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingFilter {
    allow: Option<HashSet<ContentId>>,
    deny: HashSet<ContentId>,
}

impl MissingFilter {
    /// Admits every link.
    #[must_use]
    pub fn unfiltered() -> Self {
        Self::default()
    }

    /// Admits only ids in `allow` (when given) that are not in `deny`.
    pub fn new<A, D>(allow: Option<A>, deny: D) -> Self
    where
        A: IntoIterator<Item = ContentId>,
        D: IntoIterator<Item = ContentId>,
    {
        Self {
            allow: allow.map(|ids| ids.into_iter().collect()),
            deny: deny.into_iter().collect(),
        }
    }

    /// Returns true if the id may be downloaded.
    #[must_use]
    pub fn admits_id(&self, id: &ContentId) -> bool {
        !self.deny.contains(id) && self.allow.as_ref().is_none_or(|allow| allow.contains(id))
    }

    /// Returns true if the link should be opened.
    #[must_use]
    pub fn admits(&self, link: &str) -> bool {
        ContentId::from_url(link).is_none_or(|id| self.admits_id(&id))
    }

    /// Returns true if an allow-list is set and admits nothing.
    #[must_use]
    pub fn nothing_missing(&self) -> bool {
        self.allow
            .as_ref()
            .is_some_and(|allow| allow.iter().all(|id| self.deny.contains(id)))
    }
}

/// Pipeline tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchConfig {
    /// Tabs kept open ahead of the download phase.
    pub window: usize,
    /// Delay between successive tab opens.
    pub link_delay: Duration,
    /// Workers used when the final window is drained.
    pub tab_concurrency: usize,
    /// Options for each tab download.
    pub options: TabOptions,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            window: 3,
            link_delay: Duration::from_secs(5),
            tab_concurrency: DEFAULT_TAB_CONCURRENCY,
            options: TabOptions {
                close_after: true,
                save: true,
            },
        }
    }
}

/// Result of one pipeline run.
#[derive(Debug, Default)]
pub struct PrefetchReport {
    /// Tabs opened.
    pub opened: usize,
    /// Links skipped by the filter without opening a tab.
    pub skipped: usize,
    /// Tab opens that failed.
    pub failed_opens: usize,
    /// Download phase reports.
    pub processed: Vec<TabReport>,
    /// True if the stop flag ended the run.
    pub stopped: bool,
    /// Opened tabs left undownloaded by a stop. They stay open.
    pub abandoned: Vec<Tab>,
}

/// Opens content tabs under a prefetch window and feeds the download phase.
#[derive(Debug)]
pub struct PrefetchPipeline {
    downloader: Arc<TabDownloader>,
}

impl PrefetchPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(downloader: Arc<TabDownloader>) -> Self {
        Self { downloader }
    }

    /// Runs the pipeline over `links`.
    #[instrument(skip(self, links, filter, config), fields(links = links.len(), window = config.window))]
    pub async fn run(
        &self,
        links: Vec<String>,
        filter: &MissingFilter,
        config: &PrefetchConfig,
    ) -> PrefetchReport {
        let window = config.window.max(1);
        let mut pending: VecDeque<String> = links.into();
        let mut opened: VecDeque<Tab> = VecDeque::new();
        let mut report = PrefetchReport::default();
        let mut first_open = true;

        while !pending.is_empty() || !opened.is_empty() {
            if self.downloader.stop_flag().is_stopped().await {
                info!(abandoned = opened.len(), "stop requested");
                report.stopped = true;
                report.abandoned = opened.into_iter().collect();
                break;
            }

            while opened.len() < window {
                let Some(link) = pending.pop_front() else {
                    break;
                };
                if !filter.admits(&link) {
                    debug!(link = %link, "already downloaded, skipping");
                    report.skipped += 1;
                    continue;
                }

                if !first_open && !config.link_delay.is_zero() {
                    tokio::time::sleep(config.link_delay).await;
                }
                first_open = false;

                match self.downloader.tabs().open_tab(&link, false).await {
                    Ok(tab) => {
                        debug!(link = %link, tab_id = ?tab.id, "tab opened");
                        report.opened += 1;
                        opened.push_back(tab);
                    }
                    Err(error) => {
                        warn!(link = %link, error = %error, "failed to open tab");
                        report.failed_opens += 1;
                    }
                }
            }

            if pending.is_empty() {
                let tabs: Vec<Tab> = opened.drain(..).collect();
                let batch =
                    download_tabs(&self.downloader, tabs, config.tab_concurrency, config.options)
                        .await;
                report.processed.extend(batch.reports);
                if self.downloader.stop_flag().is_stopped().await {
                    info!(abandoned = batch.unprocessed.len(), "stop requested");
                    report.stopped = true;
                    report.abandoned = batch.unprocessed;
                }
            } else if let Some(tab) = opened.pop_front() {
                let tab_report = self.downloader.download_tab(&tab, config.options).await;
                report.processed.push(tab_report);
            }
        }

        info!(
            opened = report.opened,
            processed = report.processed.len(),
            skipped = report.skipped,
            failed_opens = report.failed_opens,
            stopped = report.stopped,
            "prefetch finished"
        );
        report
    }
}
