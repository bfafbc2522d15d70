use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "group-tabs")]
#[command(version, about = "Group tab membership engine and session replayer", long_about = None)]
pub struct Args {
    /// Store document to use (default: ~/.group-tabs/store.json)
    #[arg(short, long, global = true, env = "GROUP_TABS_STORE")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a scripted browser session
    Replay {
        /// Script file (JSON)
        script: PathBuf,

        /// Keep state in memory instead of the store document
        #[arg(long)]
        ephemeral: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List persisted groups
    Groups {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Settings management
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Show version
    Version,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print current settings
    Show,

    /// Set one setting by its camelCase name
    Set { key: String, value: String },
}
