//! Link discovery on infinite-scroll listing pages.
//!
//! The loop scans the rendered links, merges them into a [`LinkSet`] and
//! scrolls for more until one of the stop conditions in [`StopReason`]
//! holds. After each scroll it waits for the page to settle: the visible
//! link count is polled until it changes and then holds for one poll, with
//! a hard ceiling.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::host::{ListingPage, Tab};
use crate::state::StopFlag;

/// Unique page URLs in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl LinkSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a URL. Returns false if it was already present.
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.order.push(url);
        true
    }

    /// Returns true if the URL is present.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    /// Number of unique URLs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.order.iter()
    }

    /// Returns the URLs in insertion order.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.order
    }
}

impl Extend<String> for LinkSet {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        for url in iter {
            self.insert(url);
        }
    }
}

impl FromIterator<String> for LinkSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for LinkSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.into_iter()
    }
}

/// Why discovery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A scan added fewer than `slack` new links.
    Plateau,
    /// The set is within `slack` of the count the page reports.
    ReachedReportedTotal,
    /// `max_iterations` scans were made.
    IterationCap,
    /// The stop flag was set.
    Stopped,
    /// Scanning or scrolling the page failed.
    ScanFailed,
}

impl StopReason {
    /// Stable label for logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plateau => "plateau",
            Self::ReachedReportedTotal => "reached_reported_total",
            Self::IterationCap => "iteration_cap",
            Self::Stopped => "stopped",
            Self::ScanFailed => "scan_failed",
        }
    }
}

/// Discovery tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Counts closer than this are considered equal.
    pub slack: usize,
    /// Scan cap.
    pub max_iterations: usize,
    /// Settle poll interval.
    pub settle_poll: Duration,
    /// Settle ceiling.
    pub settle_ceiling: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            slack: 6,
            max_iterations: 16,
            settle_poll: Duration::from_millis(250),
            settle_ceiling: Duration::from_secs(3),
        }
    }
}

/// Result of one discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Links found.
    pub links: LinkSet,
    /// Scans made (settle polls excluded).
    pub iterations: usize,
    /// Why the loop ended.
    pub reason: StopReason,
}

/// Scroll-and-scan loop over a listing page.
pub struct LinkDiscovery {
    page: Arc<dyn ListingPage>,
    stop: StopFlag,
    config: DiscoveryConfig,
}

impl LinkDiscovery {
    /// Creates a discovery loop.
    pub fn new(page: Arc<dyn ListingPage>, stop: StopFlag, config: DiscoveryConfig) -> Self {
        Self { page, stop, config }
    }

    /// Collects the listing's links.
    ///
    /// Never fails: a scan error ends the loop with the links found so far.
    #[instrument(skip(self, tab), fields(url = %tab.url))]
    pub async fn discover(&self, tab: &Tab) -> DiscoveryReport {
        let slack = self.config.slack;
        let mut links = LinkSet::new();
        let mut iterations = 0;

        let reason = loop {
            if iterations >= self.config.max_iterations {
                break StopReason::IterationCap;
            }
            if self.stop.is_stopped().await {
                break StopReason::Stopped;
            }

            let snapshot = match self.page.scan(tab).await {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    warn!(error = %error, "listing scan failed");
                    break StopReason::ScanFailed;
                }
            };
            iterations += 1;

            let visible = snapshot.links.len();
            let previous = links.len();
            links.extend(snapshot.links);
            debug!(
                iteration = iterations,
                visible,
                total = links.len(),
                reported = ?snapshot.reported_total,
                "listing scanned"
            );

            if links.len().abs_diff(previous) < slack {
                break StopReason::Plateau;
            }
            if let Some(total) = snapshot.reported_total
                && links.len().abs_diff(total) < slack
            {
                break StopReason::ReachedReportedTotal;
            }
            if iterations >= self.config.max_iterations {
                break StopReason::IterationCap;
            }

            if let Err(error) = self.page.scroll_to_end(tab).await {
                warn!(error = %error, "listing scroll failed");
                break StopReason::ScanFailed;
            }
            self.settle(tab, visible).await;
        };

        info!(
            links = links.len(),
            iterations,
            reason = reason.as_str(),
            "discovery finished"
        );
        DiscoveryReport {
            links,
            iterations,
            reason,
        }
    }

    /// Waits until the visible count changes and then holds for one poll.
    async fn settle(&self, tab: &Tab, baseline: usize) -> Duration {
        let started = Instant::now();
        let ceiling = self.config.settle_ceiling;
        let mut last = baseline;
        let mut changed = false;

        while let Some(remaining) = ceiling.checked_sub(started.elapsed()) {
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(self.config.settle_poll.min(remaining)).await;

            let count = match self.page.scan(tab).await {
                Ok(snapshot) => snapshot.links.len(),
                Err(_) => break,
            };
            if count != last {
                changed = true;
                last = count;
            } else if changed {
                break;
            }
        }

        let waited = started.elapsed();
        debug!(waited_ms = waited.as_millis(), changed, "settle done");
        waited
    }
}

impl std::fmt::Debug for LinkDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkDiscovery")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
