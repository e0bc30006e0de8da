//! Error types for the download module.
//!
//! Each variant carries the media URL so log lines and notifications can
//! name the file that failed.

use thiserror::Error;

/// Host message reported when a save path is rejected by the download manager.
pub const INVALID_FILENAME: &str = "Invalid filename";

/// Errors that can occur while driving one native download.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadError {
    /// The host refused to start the download.
    ///
    /// The message is the host's own text, kept verbatim.
    #[error("download of {url} failed to start: {message}")]
    Failed {
        /// Media URL.
        url: String,
        /// Host message.
        message: String,
    },

    /// The download reached the interrupted state.
    #[error("download of {url} was interrupted")]
    Interrupted {
        /// Media URL.
        url: String,
    },

    /// A change event reported a native error.
    #[error("download of {url} reported error: {message}")]
    Native {
        /// Media URL.
        url: String,
        /// Error reason from the change event.
        message: String,
    },

    /// The driver shut down before the download reached a terminal state.
    #[error("download driver closed before {url} finished")]
    DriverClosed {
        /// Media URL.
        url: String,
    },
}

impl DownloadError {
    /// Creates an initiation failure.
    pub fn failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an interruption error.
    pub fn interrupted(url: impl Into<String>) -> Self {
        Self::Interrupted { url: url.into() }
    }

    /// Creates a native error from a change event.
    pub fn native(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Native {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a driver-closed error.
    pub fn driver_closed(url: impl Into<String>) -> Self {
        Self::DriverClosed { url: url.into() }
    }

    /// Returns the media URL the error refers to.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Failed { url, .. }
            | Self::Interrupted { url }
            | Self::Native { url, .. }
            | Self::DriverClosed { url } => url,
        }
    }

    /// Returns true if the host rejected the save path.
    #[must_use]
    pub fn is_invalid_filename(&self) -> bool {
        matches!(self, Self::Failed { message, .. } if message == INVALID_FILENAME)
    }
}
