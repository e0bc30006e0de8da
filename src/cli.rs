//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and drive the listing harvester.
///
/// The harvester's commands run inside the browser bridge; this tool
/// manages its persisted run state and queries the ledger and existence
/// services it talks to.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/harvester/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show or change persisted run state
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// Flip the stop flag between running and stopped
    ToggleStop,

    /// Ask the ledger which content ids are not recorded yet
    Missing {
        /// Content ids to look up
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Ask the existence service which files are not on disk yet
    Check {
        /// JSON file holding an array of resource descriptors
        descriptors: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum StateAction {
    /// Print every state key and its value
    Show,

    /// Set one state key
    Set {
        /// Key name, e.g. DOWNLOAD_REVERSE
        key: String,
        /// New value (1/0 for flags, integers, or a JSON id array)
        value: String,
    },
}
