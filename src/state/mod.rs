//! Persisted run state.
//!
//! User-toggled settings and the cooperative stop flag live in the
//! `kv_state` table so they survive restarts and can be changed from the
//! CLI while a run is in progress.
//!
//! | Key                          | Format        | Default |
//! |------------------------------|---------------|---------|
//! | `DOWNLOAD_STOP`              | `1` running, `0` stopped | running |
//! | `DOWNLOAD_REVERSE`           | `1` / `0`     | `0`     |
//! | `PREFETCH_WINDOW`            | integer >= 1  | 3       |
//! | `MAX_ITERATIONS`             | integer >= 1  | 16      |
//! | `WAIT_TIME_BEFORE_NEXT_LINK` | milliseconds  | 5000    |
//! | `CLOSE_TAB_ON_COMPLETE`      | `1` / `0`     | `1`     |
//! | `TOBE_DOWNLOADED_LIST`       | JSON string array | `[]` |
//! | `SKIP_IDS`                   | JSON string array | `[]` |

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

mod settings;
mod stop;
mod store;

pub use settings::RunSettings;
pub use stop::{RunState, StopFlag};
pub use store::StateStore;

/// Keys of the persisted state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    /// Cooperative stop flag.
    DownloadStop,
    /// Process listing links in reverse order.
    DownloadReverse,
    /// Number of tabs opened ahead of the download phase.
    PrefetchWindow,
    /// Discovery iteration cap.
    MaxIterations,
    /// Delay between successive tab opens, in milliseconds.
    WaitTimeBeforeNextLink,
    /// Close content tabs once their files are handled.
    CloseTabOnComplete,
    /// Content ids always treated as missing.
    ToBeDownloadedList,
    /// Content ids never downloaded.
    SkipIds,
}

/// Value format of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// `1` or `0`.
    Flag,
    /// Non-negative integer.
    Integer {
        /// Smallest accepted value.
        min: u64,
    },
    /// JSON array of strings.
    IdList,
}

impl StateKey {
    /// Every key, in display order.
    pub const ALL: [Self; 8] = [
        Self::DownloadStop,
        Self::DownloadReverse,
        Self::PrefetchWindow,
        Self::MaxIterations,
        Self::WaitTimeBeforeNextLink,
        Self::CloseTabOnComplete,
        Self::ToBeDownloadedList,
        Self::SkipIds,
    ];

    /// Returns the stored key name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DownloadStop => "DOWNLOAD_STOP",
            Self::DownloadReverse => "DOWNLOAD_REVERSE",
            Self::PrefetchWindow => "PREFETCH_WINDOW",
            Self::MaxIterations => "MAX_ITERATIONS",
            Self::WaitTimeBeforeNextLink => "WAIT_TIME_BEFORE_NEXT_LINK",
            Self::CloseTabOnComplete => "CLOSE_TAB_ON_COMPLETE",
            Self::ToBeDownloadedList => "TOBE_DOWNLOADED_LIST",
            Self::SkipIds => "SKIP_IDS",
        }
    }

    /// Returns the value format.
    #[must_use]
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::DownloadStop | Self::DownloadReverse | Self::CloseTabOnComplete => {
                ValueKind::Flag
            }
            Self::PrefetchWindow | Self::MaxIterations => ValueKind::Integer { min: 1 },
            Self::WaitTimeBeforeNextLink => ValueKind::Integer { min: 0 },
            Self::ToBeDownloadedList | Self::SkipIds => ValueKind::IdList,
        }
    }

    /// Checks a raw value against the key's format.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidValue`] describing the expected format.
    pub fn validate(self, value: &str) -> Result<(), StateError> {
        let invalid = |reason: &str| StateError::invalid(self, value, reason);
        match self.value_kind() {
            ValueKind::Flag => match value {
                "0" | "1" => Ok(()),
                _ => Err(invalid("expected 1 or 0")),
            },
            ValueKind::Integer { min } => match value.trim().parse::<u64>() {
                Ok(n) if n >= min => Ok(()),
                Ok(_) => Err(invalid(&format!("must be at least {min}"))),
                Err(_) => Err(invalid("expected a non-negative integer")),
            },
            ValueKind::IdList => serde_json::from_str::<Vec<String>>(value)
                .map(|_| ())
                .map_err(|_| invalid("expected a JSON array of strings")),
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateKey {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| StateError::UnknownKey(s.to_string()))
    }
}

/// State access errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// Query against the state table failed.
    #[error("state query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// No such key.
    #[error("unknown state key '{0}'")]
    UnknownKey(String),

    /// Stored or supplied value has the wrong format.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        /// Key the value belongs to.
        key: StateKey,
        /// Offending value.
        value: String,
        /// Expected format.
        reason: String,
    },
}

impl StateError {
    /// Creates an invalid-value error.
    pub fn invalid(key: StateKey, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.into(),
            reason: reason.into(),
        }
    }
}
