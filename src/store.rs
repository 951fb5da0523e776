//! Host-facing account store.
//!
//! The host must never see a storage failure as anything other than a log
//! line and a benign value. [`AccountStore`] wraps any [`AccountRepository`]
//! and turns every `Err` into that shape: `false`, `0`, an empty list, or a
//! silent no-op.

use tracing::{error, info, instrument, warn};

use crate::db::{Account, AccountData, AccountRepository, DbError};

/// Failure-absorbing facade over an [`AccountRepository`].
#[derive(Debug)]
pub struct AccountStore<R: AccountRepository> {
    repository: R,
}

impl<R: AccountRepository> AccountStore<R> {
    /// Wraps a repository.
    #[instrument(skip(repository), fields(backend = repository.backend_name()))]
    pub fn new(repository: R) -> Self {
        info!("Creating AccountStore");
        Self { repository }
    }

    /// The wrapped repository, for callers that want typed results.
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Unwraps the store.
    pub fn into_inner(self) -> R {
        self.repository
    }

    /// Bootstraps the schema and reports whether storage is usable.
    #[instrument(skip(self))]
    pub fn init(&self) -> bool {
        if let Err(e) = self.repository.init() {
            error!(error = %e, "Schema bootstrap failed");
        }
        match self.repository.check_connection() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Storage is not reachable");
                false
            }
        }
    }

    /// Persisted schema version, or `0` when unknown or unreadable.
    #[instrument(skip(self))]
    pub fn get_version(&self) -> i32 {
        match self.repository.version() {
            Ok(version) => version.unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "Could not read schema version");
                0
            }
        }
    }

    /// Stores a new schema version. Best effort.
    #[instrument(skip(self))]
    pub fn set_version(&self, version: i32) {
        absorb(self.repository.set_version(version), "Could not store schema version");
    }

    /// Looks up one account.
    ///
    /// Returns empty [`AccountData`] when nothing matches and `None` only when
    /// storage failed.
    #[instrument(skip(self))]
    pub fn load_account_data(&self, name: &str, identifier: Option<&str>) -> Option<AccountData> {
        match self.repository.load_account(name, identifier) {
            Ok(account) => Some(account.map(AccountData::from).unwrap_or_default()),
            Err(e) => {
                warn!(error = %e, "Could not load account");
                None
            }
        }
    }

    /// Every stored account; empty on failure.
    #[instrument(skip(self))]
    pub fn get_accounts(&self) -> Vec<Account> {
        absorb(self.repository.accounts(), "Could not list accounts").unwrap_or_default()
    }

    /// Up to `limit` richest accounts, highest first; empty on failure.
    #[instrument(skip(self))]
    pub fn load_top_accounts(&self, limit: usize) -> Vec<Account> {
        absorb(self.repository.top_accounts(limit), "Could not load leaderboard")
            .unwrap_or_default()
    }

    /// Persists a balance, creating the account if needed.
    #[instrument(skip(self))]
    pub fn save_account(&self, name: &str, identifier: Option<&str>, balance: f64) {
        absorb(
            self.repository.save_account(name, identifier, balance),
            "Could not save account",
        );
    }

    /// Persists an in-memory account copy.
    #[instrument(skip(self, account), fields(display_name = %account.display_name()))]
    pub fn save(&self, account: &Account) {
        self.save_account(
            account.display_name(),
            account.identifier().as_deref(),
            *account.balance(),
        );
    }

    /// Deletes one account; absent accounts are ignored.
    #[instrument(skip(self))]
    pub fn remove_account(&self, name: &str, identifier: Option<&str>) {
        absorb(
            self.repository.remove_account(name, identifier),
            "Could not remove account",
        );
    }

    /// Deletes every account.
    #[instrument(skip(self))]
    pub fn remove_all_accounts(&self) {
        absorb(self.repository.remove_all_accounts(), "Could not remove accounts");
    }

    /// Prunes idle accounts still at the default balance.
    #[instrument(skip(self))]
    pub fn clean(&self) {
        absorb(self.repository.clean(), "Could not prune accounts");
    }

    /// Releases the connection.
    #[instrument(skip(self))]
    pub fn close(&self) {
        self.repository.close();
    }
}

fn absorb<T>(result: Result<T, DbError>, context: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "{}", context);
            None
        }
    }
}
