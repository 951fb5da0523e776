//! Backend-agnostic account storage contract.

use crate::db::{Account, DbError, SaveOutcome};

/// Operations every storage backend provides.
///
/// Reads that find nothing return `Ok(None)` or an empty collection; `Err` is
/// reserved for storage failures. Identity matching is case-insensitive, and
/// an identifier takes precedence over a display name when both are given.
pub trait AccountRepository: Send + Sync {
    /// Identifying name of the backend.
    fn backend_name(&self) -> &str;

    /// Whether the backend can alter existing tables in place.
    fn supports_modification(&self) -> bool;

    /// Creates both tables if absent. Safe to call repeatedly.
    fn init(&self) -> Result<(), DbError>;

    /// Makes sure a live connection is in place, opening one if needed.
    fn check_connection(&self) -> Result<(), DbError>;

    /// Persisted schema version, `None` when the table has no row.
    fn version(&self) -> Result<Option<i32>, DbError>;

    /// Replaces the persisted schema version.
    fn set_version(&self, version: i32) -> Result<(), DbError>;

    /// Looks up one account.
    fn load_account(&self, name: &str, identifier: Option<&str>)
    -> Result<Option<Account>, DbError>;

    /// Every stored account, in engine order.
    fn accounts(&self) -> Result<Vec<Account>, DbError>;

    /// Up to `limit` accounts by balance, highest first. Ties come back in
    /// whatever order the engine yields them.
    fn top_accounts(&self, limit: usize) -> Result<Vec<Account>, DbError>;

    /// Updates the account matched by identity, or inserts it if none matched.
    fn save_account(
        &self,
        name: &str,
        identifier: Option<&str>,
        balance: f64,
    ) -> Result<SaveOutcome, DbError>;

    /// Deletes the account matched by identity. Returns rows removed.
    fn remove_account(&self, name: &str, identifier: Option<&str>) -> Result<usize, DbError>;

    /// Deletes every account. Returns rows removed.
    fn remove_all_accounts(&self) -> Result<usize, DbError>;

    /// Deletes accounts sitting at the default balance whose players are not
    /// currently active. Returns rows removed.
    fn clean(&self) -> Result<usize, DbError>;

    /// Releases the connection. Never fails.
    fn close(&self);
}

/// Answers whether a player is currently active on the host.
pub trait PlayerPresence: Send + Sync {
    /// True if `name` belongs to a player who is online right now.
    fn is_active(&self, name: &str) -> bool;
}

impl<F> PlayerPresence for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_active(&self, name: &str) -> bool {
        self(name)
    }
}

/// Presence source for offline tooling: nobody is online.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoActivePlayers;

impl PlayerPresence for NoActivePlayers {
    fn is_active(&self, _name: &str) -> bool {
        false
    }
}
