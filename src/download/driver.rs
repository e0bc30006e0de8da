//! Native download driver.
//!
//! Turns the host's "start a download, then watch change events" primitive
//! into one awaitable call per file. Each driver owns its registry of
//! in-flight downloads; change events are fed in through
//! [`DownloadDriver::spawn_event_pump`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::error::DownloadError;
use crate::descriptor::{ContentId, ResourceDescriptor};
use crate::host::{DownloadDelta, DownloadHost, DownloadId, DownloadRequest, NativeState};

/// Lifecycle of one tracked download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, not yet handed to the host.
    Pending,
    /// Started by the host.
    Active,
    /// Finished successfully.
    Complete,
    /// Interrupted by the host.
    Interrupted,
    /// Failed with a native error.
    Failed,
}

impl TaskState {
    /// Returns true for absorbing states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Interrupted | Self::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
            Self::Complete | Self::Interrupted | Self::Failed => 2,
        }
    }
}

/// One descriptor and its download state.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    descriptor: ResourceDescriptor,
    state: TaskState,
}

impl DownloadTask {
    /// Creates a pending task.
    #[must_use]
    pub fn new(descriptor: ResourceDescriptor) -> Self {
        Self {
            descriptor,
            state: TaskState::Pending,
        }
    }

    /// Returns the descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Moves the task forward.
    ///
    /// Returns false and leaves the state untouched when the transition
    /// would go backwards or leave a terminal state.
    pub fn advance(&mut self, next: TaskState) -> bool {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            return false;
        }
        self.state = next;
        true
    }
}

/// Platform fields recorded with a finished download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformMetadata {
    /// Author display name.
    pub author_name: String,
    /// Content id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
    /// Content title.
    pub title: String,
}

/// Metadata of a finished download, posted to the ledger's file endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadMetadata {
    /// Final on-disk filename reported by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// File size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Platform label.
    pub source_platform: String,
    /// Media URL.
    pub source_url: String,
    /// Content page URL.
    pub source_page_url: String,
    /// Author, id and title of the content.
    pub platform_metadata: PlatformMetadata,
}

impl DownloadMetadata {
    /// Seeds metadata from a descriptor.
    ///
    /// `default_platform` applies when the descriptor carries no platform.
    #[must_use]
    pub fn from_descriptor(descriptor: &ResourceDescriptor, default_platform: &str) -> Self {
        Self {
            filename: None,
            size: None,
            source_platform: descriptor
                .source_platform
                .clone()
                .unwrap_or_else(|| default_platform.to_string()),
            source_url: descriptor.url.clone(),
            source_page_url: descriptor.source_page_url.clone(),
            platform_metadata: PlatformMetadata {
                author_name: descriptor.author_name.clone(),
                content_id: descriptor.content_id.clone(),
                title: descriptor.title.clone(),
            },
        }
    }

    /// Merges a change event. The first non-empty value of each field wins.
    pub fn absorb(&mut self, delta: &DownloadDelta) {
        if self.filename.is_none() {
            self.filename = delta.filename.clone().filter(|f| !f.is_empty());
        }
        if self.size.is_none() {
            self.size = delta.file_size;
        }
    }
}

/// Successful download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResult {
    /// Host download id.
    pub download_id: DownloadId,
    /// Accumulated metadata.
    pub metadata: DownloadMetadata,
    /// Descriptor that was downloaded.
    pub descriptor: ResourceDescriptor,
}

type Completion = oneshot::Sender<Result<DownloadResult, DownloadError>>;

struct Tracked {
    task: DownloadTask,
    metadata: DownloadMetadata,
    done: Completion,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<DownloadId, Tracked>,
    /// Host calls in progress whose ids are not known yet.
    initiating: usize,
    /// Events that arrived for untracked ids while a host call was in progress.
    early: HashMap<DownloadId, Vec<DownloadDelta>>,
    closed: bool,
}

impl Registry {
    /// Ends one host call, dropping buffered events once none are left.
    fn finish_initiation(&mut self) {
        self.initiating = self.initiating.saturating_sub(1);
        if self.initiating == 0 && !self.early.is_empty() {
            debug!(ids = self.early.len(), "dropping events for untracked downloads");
            self.early.clear();
        }
    }

    /// Applies one event to a tracked download, resolving it when terminal.
    fn apply(&mut self, delta: DownloadDelta) {
        let Some(tracked) = self.entries.get_mut(&delta.id) else {
            return;
        };
        tracked.metadata.absorb(&delta);

        let terminal = match (delta.state, delta.error.as_deref()) {
            (Some(NativeState::Complete), _) => Some(TaskState::Complete),
            (Some(NativeState::Interrupted), _) => Some(TaskState::Interrupted),
            (_, Some(_)) => Some(TaskState::Failed),
            (Some(NativeState::InProgress), None) => {
                tracked.task.advance(TaskState::Active);
                None
            }
            (None, None) => None,
        };

        let Some(terminal) = terminal else {
            return;
        };
        let Some(mut tracked) = self.entries.remove(&delta.id) else {
            return;
        };
        tracked.task.advance(terminal);

        let url = tracked.task.descriptor().url.clone();
        let outcome = match terminal {
            TaskState::Complete => {
                info!(download_id = %delta.id, url = %url, "download complete");
                Ok(DownloadResult {
                    download_id: delta.id,
                    metadata: tracked.metadata,
                    descriptor: tracked.task.descriptor,
                })
            }
            TaskState::Interrupted => {
                warn!(download_id = %delta.id, url = %url, "download interrupted");
                Err(DownloadError::interrupted(url))
            }
            _ => {
                let message = delta.error.unwrap_or_default();
                warn!(download_id = %delta.id, url = %url, error = %message, "download failed");
                Err(DownloadError::native(url, message))
            }
        };

        // Receiver may have been dropped by a cancelled caller.
        let _ = tracked.done.send(outcome);
    }
}

/// Drives native downloads and resolves them from change events.
pub struct DownloadDriver {
    host: Arc<dyn DownloadHost>,
    platform: String,
    registry: Mutex<Registry>,
}

impl DownloadDriver {
    /// Creates a driver over a host download primitive.
    ///
    /// `platform` is recorded in metadata for descriptors that carry none.
    pub fn new(host: Arc<dyn DownloadHost>, platform: impl Into<String>) -> Self {
        Self {
            host,
            platform: platform.into(),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Downloads one file.
    ///
    /// Calls the host exactly once and waits for a terminal change event.
    /// The registry lock is not held across the host call; events that
    /// arrive for an unknown id meanwhile are buffered and replayed once the
    /// id is registered.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Failed`] when the host refuses the download,
    /// [`DownloadError::Interrupted`] or [`DownloadError::Native`] from the
    /// terminal event, and [`DownloadError::DriverClosed`] when the event
    /// feed ends first.
    #[instrument(skip(self, descriptor), fields(url = %descriptor.url, filename = %descriptor.filename))]
    pub async fn download(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<DownloadResult, DownloadError> {
        {
            let mut registry = self.registry.lock().await;
            if registry.closed {
                return Err(DownloadError::driver_closed(&descriptor.url));
            }
            registry.initiating += 1;
        }

        let request = DownloadRequest {
            url: descriptor.url.clone(),
            filename: descriptor.filename.clone(),
        };
        let started = self.host.start_download(&request).await;

        let (tx, rx) = oneshot::channel();
        {
            let mut registry = self.registry.lock().await;
            let early = match &started {
                Ok(id) => registry.early.remove(id).unwrap_or_default(),
                Err(_) => Vec::new(),
            };
            registry.finish_initiation();

            let id = started.map_err(|e| DownloadError::failed(&descriptor.url, e.message()))?;
            if registry.closed {
                return Err(DownloadError::driver_closed(&descriptor.url));
            }

            let mut task = DownloadTask::new(descriptor.clone());
            task.advance(TaskState::Active);
            registry.entries.insert(
                id,
                Tracked {
                    task,
                    metadata: DownloadMetadata::from_descriptor(descriptor, &self.platform),
                    done: tx,
                },
            );
            debug!(download_id = %id, replayed = early.len(), "download started");
            for delta in early {
                registry.apply(delta);
            }
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(DownloadError::driver_closed(&descriptor.url)),
        }
    }

    /// Applies one change event.
    ///
    /// Events for ids this driver does not track are ignored, unless a host
    /// call is still in progress and the id may be its own.
    pub async fn handle_delta(&self, delta: DownloadDelta) {
        let mut registry = self.registry.lock().await;
        if !registry.entries.contains_key(&delta.id) {
            if registry.initiating > 0 {
                registry.early.entry(delta.id).or_default().push(delta);
            } else {
                debug!(download_id = %delta.id, "ignoring event for untracked download");
            }
            return;
        }
        registry.apply(delta);
    }

    /// Consumes the host's change feed on a background task.
    ///
    /// When the feed ends the driver shuts down: pending downloads resolve
    /// with [`DownloadError::DriverClosed`] and new ones are refused.
    pub fn spawn_event_pump(
        self: &Arc<Self>,
        mut events: mpsc::UnboundedReceiver<DownloadDelta>,
    ) -> JoinHandle<()> {
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(delta) = events.recv().await {
                driver.handle_delta(delta).await;
            }
            driver.shutdown().await;
        })
    }

    /// Drops every pending download and refuses new ones.
    pub async fn shutdown(&self) {
        let mut registry = self.registry.lock().await;
        registry.closed = true;
        let dropped = registry.entries.len();
        registry.entries.clear();
        registry.early.clear();
        if dropped > 0 {
            warn!(dropped, "download driver closed with pending downloads");
        }
    }

    /// Returns the number of downloads awaiting a terminal event.
    pub async fn in_flight(&self) -> usize {
        self.registry.lock().await.entries.len()
    }
}

impl std::fmt::Debug for DownloadDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadDriver")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}
