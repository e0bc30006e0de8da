//! CLI entry point for the harvester tool.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use harvester_core::style::{Style, colors_enabled, paint_if};
use harvester_core::{
    ContentId, Database, ExistenceCheck, ExistenceFilter, HarvestConfig, Ledger, LedgerClient,
    LogNotifier, ResourceDescriptor, RunState, StateKey, StateStore, StopFlag,
    remote::ServiceClient,
};
use tracing::{debug, info};

mod cli;

use cli::{Args, Command, StateAction};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = HarvestConfig::load(args.config.as_deref()).context("failed to load config")?;
    let color = colors_enabled();

    match args.command {
        Command::State { action } => {
            let store = open_state(&config).await?;
            match action {
                StateAction::Show => show_state(&store, color).await?,
                StateAction::Set { key, value } => {
                    let key: StateKey = key.parse()?;
                    store
                        .set_raw(key, &value)
                        .await
                        .with_context(|| format!("failed to set {key}"))?;
                    println!("{key} = {value}");
                }
            }
        }
        Command::ToggleStop => {
            let store = open_state(&config).await?;
            let state = StopFlag::new(store)
                .toggle()
                .await
                .context("failed to toggle stop flag")?;
            let style = match state {
                RunState::Running => Style::Green,
                RunState::Stopped => Style::Yellow,
            };
            println!("{}", paint_if(color, style, &state.to_string()));
        }
        Command::Missing { ids } => {
            let client = service_client(&config)?;
            let ledger = LedgerClient::new(client, &config.ledger_url, &config.platform);
            let ids: Vec<ContentId> = ids.into_iter().map(ContentId::new).collect();
            let Some(missing) = ledger.find_missing_ids(&ids).await else {
                bail!("ledger unreachable at {}", config.ledger_url);
            };
            info!(queried = ids.len(), missing = missing.len(), "ledger answered");
            for id in &missing {
                println!("{id}");
            }
            eprintln!(
                "{}",
                paint_if(
                    color,
                    Style::Dim,
                    &format!("{} of {} missing", missing.len(), ids.len())
                )
            );
        }
        Command::Check { descriptors } => {
            let input = read_descriptors(&descriptors)?;
            let client = service_client(&config)?;
            let filter = ExistenceFilter::new(
                client,
                &config.existence_url,
                &config.downloads_location,
                Arc::new(LogNotifier),
            );
            let total = input.len();
            let absent = filter.filter_existing(input).await;
            for descriptor in &absent {
                println!("{}", descriptor.filename);
            }
            eprintln!(
                "{}",
                paint_if(
                    color,
                    Style::Dim,
                    &format!("{} of {total} not on disk", absent.len())
                )
            );
        }
    }

    Ok(())
}

async fn open_state(config: &HarvestConfig) -> Result<StateStore> {
    let path = config.state_db_path();
    let db = Database::new(&path)
        .await
        .with_context(|| format!("failed to open state database {}", path.display()))?;
    Ok(StateStore::new(db))
}

fn service_client(config: &HarvestConfig) -> Result<ServiceClient> {
    ServiceClient::with_timeouts(config.connect_timeout_secs, config.read_timeout_secs)
        .context("failed to build HTTP client")
}

fn read_descriptors(path: &Path) -> Result<Vec<ResourceDescriptor>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid descriptor JSON in {}", path.display()))
}

async fn show_state(store: &StateStore, color: bool) -> Result<()> {
    let snapshot = store.snapshot().await.context("failed to read state")?;
    for (key, value) in snapshot {
        let key = paint_if(color, Style::Bold, key.as_str());
        match value {
            Some(value) => println!("{key} = {}", paint_if(color, Style::Cyan, &value)),
            None => println!("{key} {}", paint_if(color, Style::Dim, "(unset)")),
        }
    }
    Ok(())
}
