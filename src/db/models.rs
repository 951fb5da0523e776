//! Account records and row types.

use derive_getters::Getters;
use derive_new::new;
use diesel::QueryableByName;
use diesel::sql_types::{Double, Integer, Nullable, Text};
use tracing::instrument;

/// One player's balance.
///
/// Values returned by a repository are detached copies; changing one does not
/// persist anything until it is passed back to `save_account`.
#[derive(Debug, Clone, PartialEq, Getters, new)]
pub struct Account {
    /// Last known display name.
    display_name: String,
    /// Stable player identifier, if the host knows one.
    identifier: Option<String>,
    /// Currency amount.
    balance: f64,
}

impl Account {
    /// Replaces the balance on this copy.
    #[instrument(skip(self), fields(display_name = %self.display_name))]
    pub fn set_balance(&mut self, balance: f64) {
        self.balance = balance;
    }

    /// Replaces the display name on this copy.
    #[instrument(skip(self), fields(display_name = %self.display_name))]
    pub fn set_display_name(&mut self, display_name: impl Into<String> + std::fmt::Debug) {
        self.display_name = display_name.into();
    }

    /// The identity used to match this account in storage.
    pub fn identity(&self) -> Identity<'_> {
        Identity::resolve(&self.display_name, self.identifier.as_deref())
    }
}

/// Result of a single-account lookup.
///
/// The empty value (both fields `None`) means the account was not found.
#[derive(Debug, Clone, Default, PartialEq, Getters)]
pub struct AccountData {
    /// Stored balance.
    money: Option<f64>,
    /// Stored display name.
    name: Option<String>,
}

impl AccountData {
    /// Returns true when the lookup matched nothing.
    pub fn is_empty(&self) -> bool {
        self.money.is_none() && self.name.is_none()
    }
}

impl From<Account> for AccountData {
    fn from(account: Account) -> Self {
        Self {
            money: Some(account.balance),
            name: Some(account.display_name),
        }
    }
}

/// How an account is matched in storage.
///
/// The identifier wins whenever one is supplied; the display name is the
/// fallback. Matching is case-insensitive either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity<'a> {
    /// Match on the identifier column.
    Identifier(&'a str),
    /// Match on the display-name column.
    Name(&'a str),
}

impl<'a> Identity<'a> {
    /// Picks the identifier when present, else the name.
    pub fn resolve(name: &'a str, identifier: Option<&'a str>) -> Self {
        match identifier {
            Some(id) => Self::Identifier(id),
            None => Self::Name(name),
        }
    }

    /// The value bound into the match clause.
    pub fn key(&self) -> &'a str {
        match *self {
            Self::Identifier(key) | Self::Name(key) => key,
        }
    }
}

/// Outcome of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Existing rows were updated (count of rows touched).
    Updated(usize),
    /// No row matched, so a new one was inserted.
    Inserted,
}

/// Raw account row. Column names are aliased in the SELECT so the configured
/// names never leak into the row type.
///
/// Engines outside diesel build rows with [`AccountRow::new`].
#[derive(Debug, Clone, PartialEq, QueryableByName, Getters, new)]
pub struct AccountRow {
    /// Value of the display-name column.
    #[diesel(sql_type = Text)]
    account_name: String,
    /// Value of the identifier column.
    #[diesel(sql_type = Nullable<Text>)]
    account_identifier: Option<String>,
    /// Value of the balance column.
    #[diesel(sql_type = Double)]
    account_balance: f64,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account::new(row.account_name, row.account_identifier, row.account_balance)
    }
}

/// Raw version row.
#[derive(Debug, Clone, Copy, QueryableByName)]
pub struct VersionRow {
    #[diesel(sql_type = Integer)]
    pub(crate) version: i32,
}
