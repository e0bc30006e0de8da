//! User commands.
//!
//! Each command marks the run as running, then drives discovery, the
//! prefetch pipeline or the tab download phase. Stopping is cooperative
//! through the persisted [`StopFlag`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::HarvestConfig;
use crate::descriptor::{ContentId, is_content_page};
use crate::discovery::{DiscoveryConfig, DiscoveryReport, LinkDiscovery};
use crate::host::{HostError, ListingPage, Tab};
use crate::pipeline::{
    DEFAULT_TAB_CONCURRENCY, MissingFilter, PrefetchConfig, PrefetchPipeline, PrefetchReport,
    TabDownloader, TabOptions, TabReport,
};
use crate::remote::Ledger;
use crate::state::{RunSettings, RunState, StateError, StateStore, StopFlag};

/// Errors from orchestrator commands.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Persisted state could not be read or written.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// A host capability failed.
    #[error("host error: {0}")]
    Host(#[from] HostError),
}

/// Options of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOptions {
    /// Whole-run mode: content tabs are closed when done.
    pub all: bool,
    /// Record downloads in the ledger.
    pub save: bool,
}

/// Commands bound to keyboard shortcuts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Discover and download every item of a listing.
    ProcessListing,
    /// Download the current content tab.
    ProcessCurrent,
    /// Download every open content tab.
    ProcessOpenTabs,
}

impl Command {
    /// Looks up a command by shortcut name.
    #[must_use]
    pub fn from_shortcut(name: &str) -> Option<Self> {
        match name {
            "RUN_ALT_L" => Some(Self::ProcessListing),
            "RUN_ALT_S" => Some(Self::ProcessCurrent),
            "RUN_ALT_A" => Some(Self::ProcessOpenTabs),
            _ => None,
        }
    }

    /// Shortcut name.
    #[must_use]
    pub fn shortcut(self) -> &'static str {
        match self {
            Self::ProcessListing => "RUN_ALT_L",
            Self::ProcessCurrent => "RUN_ALT_S",
            Self::ProcessOpenTabs => "RUN_ALT_A",
        }
    }

    /// Options the shortcut runs with.
    #[must_use]
    pub fn default_options(self) -> CommandOptions {
        match self {
            Self::ProcessListing => CommandOptions {
                all: true,
                save: true,
            },
            Self::ProcessCurrent => CommandOptions {
                all: false,
                save: true,
            },
            Self::ProcessOpenTabs => CommandOptions {
                all: false,
                save: false,
            },
        }
    }
}

/// Result of a listing run.
#[derive(Debug)]
pub struct ListingReport {
    /// Discovery result.
    pub discovery: DiscoveryReport,
    /// False if the ledger could not be queried.
    pub ledger_reachable: bool,
    /// True if the run ended before opening tabs because nothing was missing.
    pub short_circuited: bool,
    /// Pipeline result, absent when short-circuited.
    pub prefetch: Option<PrefetchReport>,
}

/// Result of a dispatched command.
#[derive(Debug)]
pub enum CommandReport {
    /// [`Command::ProcessListing`].
    Listing(ListingReport),
    /// [`Command::ProcessCurrent`].
    Current(TabReport),
    /// [`Command::ProcessOpenTabs`].
    OpenTabs(Vec<TabReport>),
}

/// Entry point for user commands.
pub struct Orchestrator {
    store: StateStore,
    stop: StopFlag,
    page: Arc<dyn ListingPage>,
    ledger: Arc<dyn Ledger>,
    downloader: Arc<TabDownloader>,
    discovery: DiscoveryConfig,
    tab_concurrency: usize,
    page_host: String,
    focus_delay: Duration,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("discovery", &self.discovery)
            .field("tab_concurrency", &self.tab_concurrency)
            .field("page_host", &self.page_host)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator. The stop flag is taken from `downloader`.
    pub fn new(
        store: StateStore,
        page: Arc<dyn ListingPage>,
        ledger: Arc<dyn Ledger>,
        downloader: Arc<TabDownloader>,
    ) -> Self {
        Self {
            stop: downloader.stop_flag().clone(),
            store,
            page,
            ledger,
            downloader,
            discovery: DiscoveryConfig::default(),
            tab_concurrency: DEFAULT_TAB_CONCURRENCY,
            page_host: String::new(),
            focus_delay: Duration::from_secs(3),
        }
    }

    /// Sets discovery tuning. The iteration cap is overridden by persisted state.
    #[must_use]
    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Sets the tab worker count used when the prefetch window is drained.
    #[must_use]
    pub fn with_tab_concurrency(mut self, tab_concurrency: usize) -> Self {
        self.tab_concurrency = tab_concurrency;
        self
    }

    /// Sets the site host and the wait after focusing unrendered tabs.
    #[must_use]
    pub fn with_focus(mut self, page_host: impl Into<String>, focus_delay: Duration) -> Self {
        self.page_host = page_host.into();
        self.focus_delay = focus_delay;
        self
    }

    /// Applies discovery tuning, tab concurrency and focus settings from the
    /// config file.
    #[must_use]
    pub fn with_config(self, config: &HarvestConfig) -> Self {
        self.with_discovery(config.discovery_config())
            .with_tab_concurrency(config.tab_concurrency)
            .with_focus(config.page_host.clone(), config.focus_delay())
    }

    /// Runs a command on `tab`.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] if state or a host capability fails.
    pub async fn dispatch(
        &self,
        command: Command,
        tab: &Tab,
    ) -> Result<CommandReport, OrchestratorError> {
        let options = command.default_options();
        info!(command = command.shortcut(), "command triggered");
        Ok(match command {
            Command::ProcessListing => {
                CommandReport::Listing(self.process_listing(tab, options).await?)
            }
            Command::ProcessCurrent => {
                CommandReport::Current(self.process_single(tab, options).await?)
            }
            Command::ProcessOpenTabs => {
                CommandReport::OpenTabs(self.process_open_tabs(options).await?)
            }
        })
    }

    /// Flips the stop flag.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::State`] if the flag cannot be updated.
    pub async fn toggle_stop(&self) -> Result<RunState, OrchestratorError> {
        Ok(self.stop.toggle().await?)
    }

    /// Discovers a listing's links and downloads the missing content.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::State`] if settings cannot be loaded.
    #[instrument(skip(self, tab, options), fields(url = %tab.url))]
    pub async fn process_listing(
        &self,
        tab: &Tab,
        options: CommandOptions,
    ) -> Result<ListingReport, OrchestratorError> {
        self.stop.mark_running().await?;
        let settings = RunSettings::load(&self.store).await?;

        let discovery_config = DiscoveryConfig {
            max_iterations: settings.max_iterations,
            ..self.discovery.clone()
        };
        let discovery =
            LinkDiscovery::new(Arc::clone(&self.page), self.stop.clone(), discovery_config)
                .discover(tab)
                .await;

        let mut links = discovery.links.clone().into_vec();
        if settings.reverse {
            links.reverse();
        }

        let ids: Vec<ContentId> = links.iter().filter_map(|l| ContentId::from_url(l)).collect();
        let missing = self.ledger.find_missing_ids(&ids).await;
        let ledger_reachable = missing.is_some();
        if !ledger_reachable {
            warn!("ledger unreachable, falling back to the to-be-downloaded list");
        }
        let filter = missing_filter(missing, &settings);

        if links.is_empty() || filter.nothing_missing() {
            info!(links = links.len(), "nothing missing");
            return Ok(ListingReport {
                discovery,
                ledger_reachable,
                short_circuited: true,
                prefetch: None,
            });
        }

        let config = PrefetchConfig {
            window: settings.prefetch_window,
            link_delay: settings.link_delay,
            tab_concurrency: self.tab_concurrency,
            options: tab_options(options, &settings),
        };
        let prefetch = PrefetchPipeline::new(Arc::clone(&self.downloader))
            .run(links, &filter, &config)
            .await;

        Ok(ListingReport {
            discovery,
            ledger_reachable,
            short_circuited: false,
            prefetch: Some(prefetch),
        })
    }

    /// Runs the tab download phase on one tab.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::State`] if settings cannot be loaded.
    pub async fn process_single(
        &self,
        tab: &Tab,
        options: CommandOptions,
    ) -> Result<TabReport, OrchestratorError> {
        self.stop.mark_running().await?;
        let settings = RunSettings::load(&self.store).await?;
        Ok(self
            .downloader
            .download_tab(tab, tab_options(options, &settings))
            .await)
    }

    /// Downloads every open content tab, one at a time.
    ///
    /// Tabs whose title still shows the site host are focused first so the
    /// browser renders them.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError`] if tabs cannot be listed or settings
    /// cannot be loaded.
    #[instrument(skip(self, options))]
    pub async fn process_open_tabs(
        &self,
        options: CommandOptions,
    ) -> Result<Vec<TabReport>, OrchestratorError> {
        self.stop.mark_running().await?;
        let settings = RunSettings::load(&self.store).await?;
        let tabs = self.downloader.tabs();

        let content: Vec<Tab> = tabs
            .list_tabs()
            .await?
            .into_iter()
            .filter(|tab| is_content_page(&tab.url))
            .collect();
        info!(tabs = content.len(), "open content tabs");

        for tab in &content {
            let title = match tabs.document_title(tab).await {
                Ok(title) => title.or_else(|| tab.title.clone()),
                Err(error) => {
                    debug!(url = %tab.url, error = %error, "title read failed");
                    tab.title.clone()
                }
            };
            let unrendered = !self.page_host.is_empty()
                && title.as_deref().is_some_and(|t| t.starts_with(&self.page_host));
            if let (true, Some(tab_id)) = (unrendered, tab.id) {
                debug!(tab_id, "focusing unrendered tab");
                if let Err(error) = tabs.focus_tab(tab_id).await {
                    warn!(tab_id, error = %error, "failed to focus tab");
                    continue;
                }
                tokio::time::sleep(self.focus_delay).await;
            }
        }

        let tab_options = tab_options(options, &settings);
        let mut reports = Vec::with_capacity(content.len());
        for tab in &content {
            if self.stop.is_stopped().await {
                info!(remaining = content.len() - reports.len(), "stop requested");
                break;
            }
            reports.push(self.downloader.download_tab(tab, tab_options).await);
        }
        Ok(reports)
    }
}

/// Builds the id filter for a listing run.
///
/// The ledger's missing ids are extended with the to-be-downloaded list.
/// When the ledger is unreachable the list alone is used, or nothing is
/// filtered if it is empty.
fn missing_filter(missing: Option<Vec<ContentId>>, settings: &RunSettings) -> MissingFilter {
    let allow = match missing {
        Some(mut ids) => {
            ids.extend(settings.to_be_downloaded.iter().cloned());
            Some(ids)
        }
        None if settings.to_be_downloaded.is_empty() => None,
        None => Some(settings.to_be_downloaded.clone()),
    };
    MissingFilter::new(allow, settings.skip_ids.iter().cloned())
}

fn tab_options(options: CommandOptions, settings: &RunSettings) -> TabOptions {
    TabOptions {
        close_after: options.all && settings.close_tab_on_complete,
        save: options.save,
    }
}
