//! Run settings resolved from persisted state.

use std::time::Duration;

use super::{StateError, StateKey, StateStore};
use crate::descriptor::ContentId;

/// Default number of tabs opened ahead of the download phase.
pub const DEFAULT_PREFETCH_WINDOW: u64 = 3;

/// Default discovery iteration cap.
pub const DEFAULT_MAX_ITERATIONS: u64 = 16;

/// Default delay between tab opens.
pub const DEFAULT_LINK_DELAY_MS: u64 = 5000;

/// Settings for one orchestrator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Process listing links last-to-first.
    pub reverse: bool,
    /// Prefetch window.
    pub prefetch_window: usize,
    /// Discovery iteration cap.
    pub max_iterations: usize,
    /// Delay between successive tab opens.
    pub link_delay: Duration,
    /// Close content tabs when done.
    pub close_tab_on_complete: bool,
    /// Ids treated as missing regardless of the ledger.
    pub to_be_downloaded: Vec<ContentId>,
    /// Ids never processed.
    pub skip_ids: Vec<ContentId>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            reverse: false,
            prefetch_window: usize_from(DEFAULT_PREFETCH_WINDOW),
            max_iterations: usize_from(DEFAULT_MAX_ITERATIONS),
            link_delay: Duration::from_millis(DEFAULT_LINK_DELAY_MS),
            close_tab_on_complete: true,
            to_be_downloaded: Vec::new(),
            skip_ids: Vec::new(),
        }
    }
}

impl RunSettings {
    /// Loads settings, applying defaults for missing keys.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if a read fails or a stored value is malformed.
    pub async fn load(store: &StateStore) -> Result<Self, StateError> {
        let window = store
            .get_u64(StateKey::PrefetchWindow, DEFAULT_PREFETCH_WINDOW)
            .await?;
        let iterations = store
            .get_u64(StateKey::MaxIterations, DEFAULT_MAX_ITERATIONS)
            .await?;

        Ok(Self {
            reverse: store.get_flag(StateKey::DownloadReverse, false).await?,
            prefetch_window: usize_from(window).max(1),
            max_iterations: usize_from(iterations).max(1),
            link_delay: Duration::from_millis(
                store
                    .get_u64(StateKey::WaitTimeBeforeNextLink, DEFAULT_LINK_DELAY_MS)
                    .await?,
            ),
            close_tab_on_complete: store.get_flag(StateKey::CloseTabOnComplete, true).await?,
            to_be_downloaded: store.get_id_list(StateKey::ToBeDownloadedList).await?,
            skip_ids: store.get_id_list(StateKey::SkipIds).await?,
        })
    }
}

fn usize_from(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
