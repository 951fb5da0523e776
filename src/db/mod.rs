//! Persistence layer for player account balances.

mod connection;
mod error;
mod models;
mod probe;
mod repository;
mod schema;
mod sql;
mod sqlite;

pub(crate) use connection::ConnectionSlot;
pub use connection::{ConnectionFactory, ProbeOutcome, SqlConnection, SqlParam};
pub use error::{DbError, DbErrorKind};
pub use models::{Account, AccountData, AccountRow, Identity, SaveOutcome, VersionRow};
pub use probe::{HEALTH_PROBE_PERIOD, HealthProbe};
pub use repository::{AccountRepository, NoActivePlayers, PlayerPresence};
pub use schema::{PRUNE_BATCH_SIZE, SchemaNames};
pub use sql::{INITIAL_SCHEMA_VERSION, SqlRepository};
pub use sqlite::{DATABASE_FILE, SqliteFactory};
