//! Concurrent download phase over several tabs.

use std::collections::VecDeque;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::tab::{TabDownloader, TabOptions, TabReport};
use crate::host::Tab;

/// Default number of tab workers.
pub const DEFAULT_TAB_CONCURRENCY: usize = 2;

/// Outcome of a tab batch.
#[derive(Debug, Default)]
pub struct TabBatch {
    /// Download phase reports, in completion order.
    pub reports: Vec<TabReport>,
    /// Tabs never picked up because the stop flag was set.
    pub unprocessed: Vec<Tab>,
}

/// Runs the tab download phase over `tabs` with up to `concurrency` workers.
///
/// Workers pop from one shared queue until it is empty or the stop flag is
/// set; the lock is released before a tab is processed. Tabs with an empty
/// URL are dropped. Report order is not guaranteed.
pub async fn download_tabs(
    downloader: &TabDownloader,
    tabs: Vec<Tab>,
    concurrency: usize,
    options: TabOptions,
) -> TabBatch {
    let queue: VecDeque<Tab> = tabs.into_iter().filter(|t| !t.url.is_empty()).collect();
    if queue.is_empty() {
        debug!("no tabs to download");
        return TabBatch::default();
    }

    let workers = concurrency.clamp(1, queue.len());
    info!(tabs = queue.len(), workers, "downloading tabs");
    let queue = Mutex::new(queue);

    let worker = |index: usize| {
        let queue = &queue;
        async move {
            let mut reports = Vec::new();
            loop {
                if downloader.stop_flag().is_stopped().await {
                    debug!(worker = index, "stop requested");
                    break;
                }
                let next = queue.lock().await.pop_front();
                let Some(tab) = next else {
                    break;
                };
                debug!(worker = index, url = %tab.url, "tab picked up");
                reports.push(downloader.download_tab(&tab, options).await);
            }
            reports
        }
    };

    let reports = join_all((0..workers).map(worker))
        .await
        .into_iter()
        .flatten()
        .collect();
    let unprocessed: Vec<Tab> = queue.into_inner().into_iter().collect();
    if !unprocessed.is_empty() {
        info!(unprocessed = unprocessed.len(), "tab batch stopped early");
    }
    TabBatch {
        reports,
        unprocessed,
    }
}
