//! Strictly Ledger - administration CLI
//!
//! Operates on the same storage a game server uses, with nobody online.

#![warn(missing_docs)]

mod cli;

use anyhow::{Result, bail};
use clap::Parser;
use cli::{Cli, Command};
use strictly_ledger::{
    Account, AccountStore, Backend, NoActivePlayers, SqlRepository, SqliteFactory, StorageConfig,
};
use tracing::{debug, info, instrument};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let store = open_store(&config)?;

    if !store.init() {
        bail!(
            "storage at {} is not reachable",
            config.data_dir().display()
        );
    }

    let result = run(&store, cli.command);
    store.close();
    result
}

/// Reads the config file (if any) and applies command-line overrides.
#[instrument(skip(cli))]
fn load_config(cli: &Cli) -> Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::from_file(path)?,
        None => StorageConfig::default(),
    };
    if let Some(data_dir) = &cli.data_dir {
        config = config.with_data_dir(data_dir.clone());
    }
    debug!(?config, "Effective configuration");
    Ok(config)
}

/// Builds the store for the configured backend.
#[instrument(skip(config), fields(backend = %config.backend()))]
fn open_store(config: &StorageConfig) -> Result<AccountStore<SqlRepository<SqliteFactory>>> {
    let repository = match config.backend() {
        Backend::Sqlite => SqlRepository::sqlite(config)?.with_presence(NoActivePlayers),
    };
    info!("Storage opened");
    Ok(AccountStore::new(repository))
}

/// Runs one subcommand against the store.
#[instrument(skip(store))]
fn run(store: &AccountStore<SqlRepository<SqliteFactory>>, command: Command) -> Result<()> {
    match command {
        Command::Init => println!("tables ready"),
        Command::Version { set: Some(version) } => {
            store.set_version(version);
            println!("version {}", store.get_version());
        }
        Command::Version { set: None } => println!("version {}", store.get_version()),
        Command::Balance { name, uuid } => {
            match store.load_account_data(&name, uuid.as_deref()) {
                None => bail!("storage unavailable"),
                Some(data) => match (data.name(), data.money()) {
                    (Some(stored), Some(money)) => println!("{}\t{}", stored, money),
                    _ => println!("no account for {}", name),
                },
            }
        }
        Command::Set { name, amount, uuid } => {
            if amount < 0.0 {
                bail!("balance cannot be negative");
            }
            store.save_account(&name, uuid.as_deref(), amount);
        }
        Command::Remove { name, uuid } => store.remove_account(&name, uuid.as_deref()),
        Command::Top { limit } => print_accounts(&store.load_top_accounts(limit)),
        Command::List => print_accounts(&store.get_accounts()),
        Command::Clean => store.clean(),
        Command::Wipe { yes } => {
            if !yes {
                bail!("refusing to delete every account without --yes");
            }
            store.remove_all_accounts();
        }
    }
    Ok(())
}

fn print_accounts(accounts: &[Account]) {
    for (rank, account) in accounts.iter().enumerate() {
        println!(
            "{:>3}. {}\t{}\t{}",
            rank + 1,
            account.display_name(),
            account.identifier().as_deref().unwrap_or("-"),
            account.balance()
        );
    }
}
