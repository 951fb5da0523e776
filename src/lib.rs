//! Strictly Ledger - player balance storage for game servers
//!
//! Persists one balance per player behind a backend-agnostic repository.
//!
//! # Architecture
//!
//! - **Store**: host-facing facade that logs and absorbs every failure
//! - **Repository**: typed storage contract ([`AccountRepository`])
//! - **SQL base**: [`SqlRepository`], generic over a [`ConnectionFactory`],
//!   with lazy reconnect and a background [`HealthProbe`]
//! - **Engines**: [`SqliteFactory`] for a single local database file
//!
//! # Example
//!
//! ```no_run
//! use strictly_ledger::{AccountStore, SqlRepository, StorageConfig};
//!
//! # fn example() -> Result<(), strictly_ledger::DbError> {
//! let config = StorageConfig::default().with_data_dir("/srv/game/data");
//! let store = AccountStore::new(SqlRepository::sqlite(&config)?);
//! if store.init() {
//!     store.save_account("Alice", None, 25.0);
//!     let top = store.load_top_accounts(10);
//!     println!("{} accounts on the board", top.len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod config;
mod db;
mod store;

// Crate-level exports - Configuration
pub use config::{Backend, ConfigError, StorageConfig};

// Crate-level exports - Storage contract and records
pub use db::{
    Account, AccountData, AccountRepository, AccountRow, DbError, DbErrorKind, Identity,
    NoActivePlayers, PlayerPresence, SaveOutcome, VersionRow,
};

// Crate-level exports - SQL base and engines
pub use db::{
    ConnectionFactory, DATABASE_FILE, HEALTH_PROBE_PERIOD, HealthProbe, INITIAL_SCHEMA_VERSION,
    PRUNE_BATCH_SIZE, ProbeOutcome, SchemaNames, SqlConnection, SqlParam, SqlRepository,
    SqliteFactory,
};

// Crate-level exports - Host facade
pub use store::AccountStore;
