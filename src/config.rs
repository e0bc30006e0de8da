//! File configuration.
//!
//! The config file uses a `key = value` subset of TOML: double-quoted
//! strings, non-negative integers and `#` comments. Every key is optional;
//! missing keys keep their defaults.
//!
//! ```toml
//! ledger_url = "http://localhost:3000"
//! existence_url = "http://localhost:8080/pathExists"
//! downloads_location = "/data/downloads/douyin"
//! file_concurrency = 2   # files per tab
//! ```

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::discovery::DiscoveryConfig;
use crate::download::{DownloadDriver, DownloadEngine, EngineError, RetryPolicy};
use crate::pipeline::TitleWaitConfig;
use crate::remote::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};

/// Config directory name under the user config home.
const APP_DIR: &str = "harvester";

/// Config file name.
const CONFIG_FILE: &str = "config.toml";

/// Errors from loading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A line is not `key = value`.
    #[error("invalid config syntax on line {line}: expected key = value")]
    Syntax {
        /// 1-based line number.
        line: usize,
    },

    /// Key is not recognised.
    #[error("unknown configuration key '{key}' on line {line}")]
    UnknownKey {
        /// Offending key.
        key: String,
        /// 1-based line number.
        line: usize,
    },

    /// Value does not parse for its key.
    #[error("invalid `{key}` value on line {line}: {reason}")]
    InvalidValue {
        /// Key.
        key: String,
        /// 1-based line number.
        line: usize,
        /// What was expected.
        reason: String,
    },

    /// Value parses but is outside the accepted range.
    #[error("invalid config value for `{key}`: {value}. Expected range: {range}")]
    OutOfRange {
        /// Key.
        key: &'static str,
        /// Supplied value.
        value: u64,
        /// Accepted range.
        range: &'static str,
    },
}

/// Harvester configuration with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestConfig {
    /// Ledger base URL.
    pub ledger_url: String,
    /// Existence-check endpoint.
    pub existence_url: String,
    /// Platform segment of ledger URLs and default `sourcePlatform`.
    pub platform: String,
    /// Download directory sent to the existence check.
    pub downloads_location: String,
    /// State database path; defaults next to the config file.
    pub state_db: Option<PathBuf>,
    /// HTTP connect timeout.
    pub connect_timeout_secs: u64,
    /// HTTP whole-request timeout.
    pub read_timeout_secs: u64,
    /// Files downloaded concurrently per tab.
    pub file_concurrency: usize,
    /// Tabs processed concurrently when draining the prefetch window.
    pub tab_concurrency: usize,
    /// Discovery plateau slack.
    pub discovery_slack: usize,
    /// Upper bound on the post-scroll settle wait.
    pub settle_ceiling_ms: u64,
    /// Settle poll interval.
    pub settle_poll_ms: u64,
    /// Bound on the page title wait.
    pub title_timeout_ms: u64,
    /// Wait after focusing unrendered tabs.
    pub focus_delay_ms: u64,
    /// Site host; titles starting with it are not rendered yet.
    pub page_host: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            ledger_url: "http://localhost:3000".to_string(),
            existence_url: "http://localhost:8080/pathExists".to_string(),
            platform: "douyin".to_string(),
            downloads_location: String::new(),
            state_db: None,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            file_concurrency: 1,
            tab_concurrency: 2,
            discovery_slack: 6,
            settle_ceiling_ms: 3000,
            settle_poll_ms: 250,
            title_timeout_ms: 5000,
            focus_delay_ms: 3000,
            page_host: "douyin.com".to_string(),
        }
    }
}

impl HarvestConfig {
    /// Loads configuration.
    ///
    /// An explicit `path` must exist. Without one the default location is
    /// tried and defaults apply when no file is there.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match resolve_default_config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("no config file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&raw)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parses config text on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for syntax errors, unknown keys, bad values
    /// or out-of-range values.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        for (index, raw_line) in raw.lines().enumerate() {
            let line_no = index + 1;
            let line = strip_inline_comment(raw_line).trim();
            if line.is_empty() {
                continue;
            }
            let Some((raw_key, raw_value)) = line.split_once('=') else {
                return Err(ConfigError::Syntax { line: line_no });
            };
            let key = raw_key.trim();
            let value = raw_value.trim();
            let invalid = |reason: &str| ConfigError::InvalidValue {
                key: key.to_string(),
                line: line_no,
                reason: reason.to_string(),
            };
            let string = || {
                parse_string_literal(value).ok_or_else(|| invalid("expected double-quoted string"))
            };
            let integer =
                || parse_integer(value).ok_or_else(|| invalid("expected non-negative integer"));

            match key {
                "ledger_url" => cfg.ledger_url = string()?,
                "existence_url" => cfg.existence_url = string()?,
                "platform" => cfg.platform = string()?,
                "downloads_location" => cfg.downloads_location = string()?,
                "state_db" => cfg.state_db = Some(PathBuf::from(string()?)),
                "page_host" => cfg.page_host = string()?,
                "connect_timeout_secs" => cfg.connect_timeout_secs = integer()?,
                "read_timeout_secs" => cfg.read_timeout_secs = integer()?,
                "file_concurrency" => cfg.file_concurrency = to_usize(integer()?),
                "tab_concurrency" => cfg.tab_concurrency = to_usize(integer()?),
                "discovery_slack" => cfg.discovery_slack = to_usize(integer()?),
                "settle_ceiling_ms" => cfg.settle_ceiling_ms = integer()?,
                "settle_poll_ms" => cfg.settle_poll_ms = integer()?,
                "title_timeout_ms" => cfg.title_timeout_ms = integer()?,
                "focus_delay_ms" => cfg.focus_delay_ms = integer()?,
                unknown => {
                    return Err(ConfigError::UnknownKey {
                        key: unknown.to_string(),
                        line: line_no,
                    });
                }
            }
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600, "1..=3600")?;
        check_range("read_timeout_secs", self.read_timeout_secs, 1, 3600, "1..=3600")?;
        check_range("file_concurrency", self.file_concurrency as u64, 1, 100, "1..=100")?;
        check_range("tab_concurrency", self.tab_concurrency as u64, 1, 16, "1..=16")?;
        check_range("discovery_slack", self.discovery_slack as u64, 1, 1000, "1..=1000")?;
        check_range("settle_poll_ms", self.settle_poll_ms, 10, 10_000, "10..=10000")?;
        check_range(
            "settle_ceiling_ms",
            self.settle_ceiling_ms,
            self.settle_poll_ms,
            60_000,
            "settle_poll_ms..=60000",
        )?;
        check_range("title_timeout_ms", self.title_timeout_ms, 0, 120_000, "0..=120000")?;
        check_range("focus_delay_ms", self.focus_delay_ms, 0, 60_000, "0..=60000")?;
        Ok(())
    }

    /// Resolves the state database path.
    ///
    /// Uses `state_db` when set, else `state.db` in the config directory,
    /// else `harvester-state.db` in the working directory.
    #[must_use]
    pub fn state_db_path(&self) -> PathBuf {
        if let Some(path) = &self.state_db {
            return path.clone();
        }
        resolve_default_config_path()
            .and_then(|p| p.parent().map(|dir| dir.join("state.db")))
            .unwrap_or_else(|| PathBuf::from("harvester-state.db"))
    }

    /// Discovery tuning. The iteration cap stays at its default; persisted
    /// state overrides it per run.
    #[must_use]
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            slack: self.discovery_slack,
            settle_poll: Duration::from_millis(self.settle_poll_ms),
            settle_ceiling: Duration::from_millis(self.settle_ceiling_ms),
            ..DiscoveryConfig::default()
        }
    }

    /// Title wait for content tabs.
    #[must_use]
    pub fn title_wait(&self) -> TitleWaitConfig {
        TitleWaitConfig {
            host_prefix: self.page_host.clone(),
            timeout: Duration::from_millis(self.title_timeout_ms),
            ..TitleWaitConfig::default()
        }
    }

    /// Focus delay.
    #[must_use]
    pub fn focus_delay(&self) -> Duration {
        Duration::from_millis(self.focus_delay_ms)
    }

    /// Builds the per-tab download engine with `file_concurrency` slots.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is out of range.
    pub fn download_engine(
        &self,
        driver: Arc<DownloadDriver>,
        retry_policy: Arc<RetryPolicy>,
    ) -> Result<DownloadEngine, EngineError> {
        DownloadEngine::new(self.file_concurrency, driver, retry_policy)
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/harvester/config.toml`
/// 2. `$HOME/.config/harvester/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join(APP_DIR).join(CONFIG_FILE));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILE),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}

fn check_range(
    key: &'static str,
    value: u64,
    min: u64,
    max: u64,
    range: &'static str,
) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { key, value, range })
    }
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Option<String> {
    raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
}

fn parse_integer(raw_value: &str) -> Option<u64> {
    let token = raw_value.trim().replace('_', "");
    if token.is_empty() || token.starts_with('-') {
        return None;
    }
    token.parse().ok()
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
