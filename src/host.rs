//! Capabilities of the host browser consumed by the orchestration core.
//!
//! The core never talks to a browser directly. Native downloads, tabs,
//! listing pages, page extraction and notifications are reached through the
//! traits in this module so that the orchestration logic can run against a
//! real extension bridge or an in-process fake.
//!
//! # Object Safety
//!
//! The traits use `async_trait` so they can be shared as `Arc<dyn Trait>`.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::descriptor::ResourceInfo;

/// Identifier of a browser tab.
pub type TabId = i64;

/// Identifier assigned by the host to a native download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error reported by a host capability.
///
/// The message is kept verbatim: retry classification matches on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    /// Creates a host error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the host's message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A browser tab as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    /// Tab id; `None` for tabs described only by URL.
    pub id: Option<TabId>,
    /// Current URL.
    pub url: String,
    /// Title reported by the browser when the tab was queried.
    pub title: Option<String>,
}

impl Tab {
    /// Creates a tab handle.
    #[must_use]
    pub fn new(id: TabId, url: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            url: url.into(),
            title: None,
        }
    }

    /// Creates a handle for a URL without an open tab.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            title: None,
        }
    }
}

/// Arguments of a native download call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Media URL.
    pub url: String,
    /// Relative save path.
    pub filename: String,
}

/// Native download states carried by change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeState {
    /// Transfer running.
    InProgress,
    /// Transfer finished.
    Complete,
    /// Transfer stopped by the browser or the user.
    Interrupted,
}

/// One native download change event.
///
/// Every field except `id` is optional; a single event usually carries only
/// the fields that changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadDelta {
    /// Download the event refers to.
    pub id: DownloadId,
    /// New state, if it changed.
    pub state: Option<NativeState>,
    /// Final on-disk filename, if known.
    pub filename: Option<String>,
    /// File size in bytes, if known.
    pub file_size: Option<u64>,
    /// Error reason, if the host reported one.
    pub error: Option<String>,
}

/// Visible state of a listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingSnapshot {
    /// Item count the page itself reports, if shown.
    pub reported_total: Option<usize>,
    /// Absolute content links currently rendered.
    pub links: Vec<String>,
}

/// Errors from page extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The page shows a verification challenge instead of content.
    #[error("verification challenge blocks extraction on {url}")]
    Blocked {
        /// Page URL.
        url: String,
    },

    /// The page rendered but no downloadable resources were found.
    #[error("no resources found on {url}")]
    NoResources {
        /// Page URL.
        url: String,
    },

    /// The URL is not a content page the extractor understands.
    #[error("unsupported page {url}")]
    Unsupported {
        /// Page URL.
        url: String,
    },

    /// Script injection or tab access failed.
    #[error("host error during extraction: {0}")]
    Host(#[from] HostError),
}

/// Native download primitive.
#[async_trait]
pub trait DownloadHost: Send + Sync {
    /// Starts a download and returns its id.
    ///
    /// Change events for the download are delivered separately on the
    /// channel handed to [`crate::download::DownloadDriver::spawn_event_pump`].
    async fn start_download(&self, request: &DownloadRequest) -> Result<DownloadId, HostError>;
}

/// Tab primitives.
#[async_trait]
pub trait TabHost: Send + Sync {
    /// Opens a tab and resolves once it has finished loading.
    async fn open_tab(&self, url: &str, active: bool) -> Result<Tab, HostError>;

    /// Closes a tab.
    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    /// Makes a tab the active one.
    async fn focus_tab(&self, tab_id: TabId) -> Result<(), HostError>;

    /// Lists all open tabs.
    async fn list_tabs(&self) -> Result<Vec<Tab>, HostError>;

    /// Reads `document.title` from the page.
    async fn document_title(&self, tab: &Tab) -> Result<Option<String>, HostError>;
}

/// Listing page access (script injection on a user page).
#[async_trait]
pub trait ListingPage: Send + Sync {
    /// Returns the links currently rendered and the page's reported total.
    async fn scan(&self, tab: &Tab) -> Result<ListingSnapshot, HostError>;

    /// Scrolls the listing container to its end.
    async fn scroll_to_end(&self, tab: &Tab) -> Result<(), HostError>;
}

/// Opaque page extractor.
#[async_trait]
pub trait ResourceExtractor: Send + Sync {
    /// Extracts downloadable resources from a content tab.
    async fn extract(&self, tab: &Tab) -> Result<ResourceInfo, ExtractError>;
}

/// User-facing notifications.
pub trait Notifier: Send + Sync {
    /// Shows a notification.
    fn notify(&self, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        warn!(message, "notification");
    }
}

/// Outcome of [`wait_for_title`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleWait {
    /// Last title observed.
    pub title: Option<String>,
    /// Time spent waiting.
    pub elapsed: Duration,
    /// True if the timeout expired before a rendered title appeared.
    pub timed_out: bool,
}

/// Waits until the page title is rendered.
///
/// A title counts as rendered once it is non-empty and no longer starts
/// with `host_prefix` (the placeholder the site shows while loading).
/// Resolves with `timed_out = true` after `timeout`; a slow title is not
/// an error.
pub async fn wait_for_title(
    tabs: &dyn TabHost,
    tab: &Tab,
    host_prefix: &str,
    timeout: Duration,
    poll: Duration,
) -> TitleWait {
    let started = Instant::now();
    let mut last = None;

    loop {
        match tabs.document_title(tab).await {
            Ok(title) => last = title,
            Err(error) => debug!(url = %tab.url, error = %error, "title read failed"),
        }

        if let Some(title) = last.as_deref()
            && is_rendered_title(title, host_prefix)
        {
            return TitleWait {
                title: last,
                elapsed: started.elapsed(),
                timed_out: false,
            };
        }

        if started.elapsed() >= timeout {
            debug!(url = %tab.url, "title wait timed out");
            return TitleWait {
                title: last,
                elapsed: started.elapsed(),
                timed_out: true,
            };
        }

        tokio::time::sleep(poll).await;
    }
}

/// Returns true when a title is non-empty and not the loading placeholder.
#[must_use]
pub fn is_rendered_title(title: &str, host_prefix: &str) -> bool {
    !title.is_empty() && (host_prefix.is_empty() || !title.starts_with(host_prefix))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_host_error_keeps_message() {
        let error = HostError::new("Invalid filename");
        assert_eq!(error.message(), "Invalid filename");
        assert_eq!(error.to_string(), "Invalid filename");
    }

    #[test]
    fn test_extract_error_display() {
        let error = ExtractError::Blocked {
            url: "https://www.example.com/note/1".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("verification"), "Expected reason in: {msg}");
        assert!(msg.contains("/note/1"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_is_rendered_title() {
        assert!(is_rendered_title("Some clip - Site", "example.com"));
        assert!(!is_rendered_title("example.com/video/1", "example.com"));
        assert!(!is_rendered_title("", "example.com"));
        assert!(is_rendered_title("anything", ""));
    }

    #[test]
    fn test_tab_constructors() {
        let tab = Tab::new(3, "https://www.example.com/video/1");
        assert_eq!(tab.id, Some(3));
        let tab = Tab::from_url("https://www.example.com/video/1");
        assert!(tab.id.is_none());
    }
}
