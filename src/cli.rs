//! Command-line interface for strictly_ledger.

use clap::{Parser, Subcommand};

/// Strictly Ledger - player balance storage administration
#[derive(Parser, Debug)]
#[command(name = "strictly_ledger")]
#[command(about = "Inspect and maintain player balance storage", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to a storage config TOML file
    #[arg(short, long, global = true)]
    pub config: Option<std::path::PathBuf>,

    /// Override the data directory holding the database file
    #[arg(long, global = true)]
    pub data_dir: Option<std::path::PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the tables if they do not exist
    Init,

    /// Show or set the schema version marker
    Version {
        /// New version to store
        #[arg(long)]
        set: Option<i32>,
    },

    /// Show one account's balance
    Balance {
        /// Player display name
        name: String,

        /// Player identifier (takes precedence over the name)
        #[arg(long)]
        uuid: Option<String>,
    },

    /// Set one account's balance, creating the account if needed
    Set {
        /// Player display name
        name: String,

        /// New balance
        amount: f64,

        /// Player identifier (takes precedence over the name)
        #[arg(long)]
        uuid: Option<String>,
    },

    /// Delete one account
    Remove {
        /// Player display name
        name: String,

        /// Player identifier (takes precedence over the name)
        #[arg(long)]
        uuid: Option<String>,
    },

    /// Show the richest accounts
    Top {
        /// How many accounts to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List every account
    List,

    /// Delete accounts still at the default balance
    Clean,

    /// Delete every account
    Wipe {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}
