//! Cooperative stop flag.

use std::fmt;

use tracing::{info, warn};

use super::{StateError, StateKey, StateStore};

/// Value of the stop flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Work may continue.
    Running,
    /// Loops exit at their next poll.
    Stopped,
}

impl RunState {
    fn as_flag(self) -> &'static str {
        match self {
            Self::Running => "1",
            Self::Stopped => "0",
        }
    }

    fn from_flag(raw: Option<&str>) -> Self {
        match raw {
            Some("0") => Self::Stopped,
            _ => Self::Running,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Persisted stop flag polled by discovery and the prefetch pipeline.
///
/// There is no hard cancellation: in-flight downloads finish, loops exit
/// at their next poll.
#[derive(Debug, Clone)]
pub struct StopFlag {
    store: StateStore,
}

impl StopFlag {
    /// Creates a flag backed by `store`.
    #[must_use]
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Reads the flag. Missing reads as running.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Query`] if the read fails.
    pub async fn state(&self) -> Result<RunState, StateError> {
        let raw = self.store.get_raw(StateKey::DownloadStop).await?;
        Ok(RunState::from_flag(raw.as_deref()))
    }

    /// Returns true if a stop was requested.
    ///
    /// A failed read is logged and treated as running.
    pub async fn is_stopped(&self) -> bool {
        match self.state().await {
            Ok(state) => state == RunState::Stopped,
            Err(error) => {
                warn!(error = %error, "stop flag unreadable, continuing");
                false
            }
        }
    }

    /// Sets the flag.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Query`] if the write fails.
    pub async fn set(&self, state: RunState) -> Result<(), StateError> {
        self.store
            .set_raw(StateKey::DownloadStop, state.as_flag())
            .await?;
        info!(state = %state, "stop flag set");
        Ok(())
    }

    /// Marks the run as running.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Query`] if the write fails.
    pub async fn mark_running(&self) -> Result<(), StateError> {
        self.set(RunState::Running).await
    }

    /// Requests a stop.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Query`] if the write fails.
    pub async fn request_stop(&self) -> Result<(), StateError> {
        self.set(RunState::Stopped).await
    }

    /// Flips the flag and returns the new value.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Query`] if the read or write fails.
    pub async fn toggle(&self) -> Result<RunState, StateError> {
        let next = match self.state().await? {
            RunState::Running => RunState::Stopped,
            RunState::Stopped => RunState::Running,
        };
        self.set(next).await?;
        Ok(next)
    }
}
