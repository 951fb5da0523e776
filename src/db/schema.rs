//! Configurable table and column names, and the SQL built from them.

use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::{DbError, DbErrorKind, Identity};

/// Longest accepted table or column name.
const MAX_IDENTIFIER_LEN: usize = 64;

/// Maximum number of names bound into a single pruning DELETE.
///
/// Keeps well under SQLite's default host-parameter limit.
pub const PRUNE_BATCH_SIZE: usize = 500;

/// Names of the accounts table, the version table, and the account columns.
///
/// Fixed once a repository is built. Renaming after the tables exist orphans
/// the old data.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_", into)]
#[serde(default)]
pub struct SchemaNames {
    /// Accounts table.
    accounts_table: String,
    /// Version marker table.
    version_table: String,
    /// Display-name column.
    name_column: String,
    /// Balance column.
    money_column: String,
    /// Identifier column.
    identifier_column: String,
}

impl Default for SchemaNames {
    fn default() -> Self {
        Self {
            accounts_table: "fe_accounts".to_string(),
            version_table: "fe_version".to_string(),
            name_column: "name".to_string(),
            money_column: "money".to_string(),
            identifier_column: "uuid".to_string(),
        }
    }
}

impl SchemaNames {
    /// Checks that every name is a plain SQL identifier.
    ///
    /// Names are spliced into statement text, so anything beyond
    /// `[A-Za-z_][A-Za-z0-9_]*` is refused.
    ///
    /// # Errors
    ///
    /// Returns [`DbErrorKind::InvalidSchema`] naming the first bad entry.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), DbError> {
        let entries = [
            ("accounts_table", &self.accounts_table),
            ("version_table", &self.version_table),
            ("name_column", &self.name_column),
            ("money_column", &self.money_column),
            ("identifier_column", &self.identifier_column),
        ];
        for (field, value) in entries {
            if !is_identifier(value) {
                return Err(DbError::new(
                    DbErrorKind::InvalidSchema,
                    format!("{} '{}' is not a valid SQL identifier", field, value),
                ));
            }
        }
        let columns = [&self.name_column, &self.money_column, &self.identifier_column];
        for (i, a) in columns.iter().enumerate() {
            if columns[i + 1..].iter().any(|b| a.eq_ignore_ascii_case(b)) {
                return Err(DbError::new(
                    DbErrorKind::InvalidSchema,
                    format!("column '{}' is configured twice", a),
                ));
            }
        }
        if self.accounts_table.eq_ignore_ascii_case(&self.version_table) {
            return Err(DbError::new(
                DbErrorKind::InvalidSchema,
                "accounts and version tables share a name",
            ));
        }
        Ok(())
    }
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    value.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Statement text rendered once from a validated [`SchemaNames`].
#[derive(Debug, Clone)]
pub(crate) struct Statements {
    pub create_accounts: String,
    pub create_version: String,
    pub select_version: String,
    pub clear_version: String,
    pub insert_version: String,
    pub select_all: String,
    pub select_top: String,
    pub select_by_name: String,
    pub select_by_identifier: String,
    pub select_by_balance: String,
    pub update_by_name: String,
    pub update_by_identifier: String,
    pub insert_account: String,
    pub delete_by_name: String,
    pub delete_by_identifier: String,
    pub delete_all: String,
    accounts_table: String,
    name_column: String,
    money_column: String,
}

impl Statements {
    #[instrument(skip(names), fields(accounts = %names.accounts_table, version = %names.version_table))]
    pub fn render(names: &SchemaNames) -> Self {
        let t = &names.accounts_table;
        let v = &names.version_table;
        let user = &names.name_column;
        let money = &names.money_column;
        let uuid = &names.identifier_column;

        let select_all = format!(
            "SELECT {user} AS account_name, {uuid} AS account_identifier, \
             {money} AS account_balance FROM {t}"
        );
        let statements = Self {
            create_accounts: format!(
                "CREATE TABLE IF NOT EXISTS {t} ({user} varchar(64) NOT NULL, \
                 {uuid} varchar(36), {money} double NOT NULL)"
            ),
            create_version: format!("CREATE TABLE IF NOT EXISTS {v} (version int NOT NULL)"),
            select_version: format!("SELECT version FROM {v} LIMIT 1"),
            clear_version: format!("DELETE FROM {v}"),
            insert_version: format!("INSERT INTO {v} (version) VALUES (?)"),
            select_top: format!("{select_all} ORDER BY {money} DESC LIMIT ?"),
            select_by_name: format!("{select_all} WHERE UPPER({user}) = UPPER(?)"),
            select_by_identifier: format!("{select_all} WHERE UPPER({uuid}) = UPPER(?)"),
            select_by_balance: format!("{select_all} WHERE {money} = ?"),
            update_by_name: format!(
                "UPDATE {t} SET {money} = ?, {user} = ? WHERE UPPER({user}) = UPPER(?)"
            ),
            update_by_identifier: format!(
                "UPDATE {t} SET {money} = ?, {user} = ? WHERE UPPER({uuid}) = UPPER(?)"
            ),
            insert_account: format!("INSERT INTO {t} ({user}, {uuid}, {money}) VALUES (?, ?, ?)"),
            delete_by_name: format!("DELETE FROM {t} WHERE UPPER({user}) = UPPER(?)"),
            delete_by_identifier: format!("DELETE FROM {t} WHERE UPPER({uuid}) = UPPER(?)"),
            delete_all: format!("DELETE FROM {t}"),
            select_all,
            accounts_table: t.clone(),
            name_column: user.clone(),
            money_column: money.clone(),
        };
        debug!("Statements rendered");
        statements
    }

    pub fn select_by(&self, identity: Identity<'_>) -> &str {
        match identity {
            Identity::Identifier(_) => &self.select_by_identifier,
            Identity::Name(_) => &self.select_by_name,
        }
    }

    pub fn update_by(&self, identity: Identity<'_>) -> &str {
        match identity {
            Identity::Identifier(_) => &self.update_by_identifier,
            Identity::Name(_) => &self.update_by_name,
        }
    }

    pub fn delete_by(&self, identity: Identity<'_>) -> &str {
        match identity {
            Identity::Identifier(_) => &self.delete_by_identifier,
            Identity::Name(_) => &self.delete_by_name,
        }
    }

    /// Deletes rows at a given balance whose name is one of `count` bound
    /// names. The balance is the first parameter.
    pub fn delete_names(&self, count: usize) -> String {
        let placeholders = vec!["?"; count].join(", ");
        format!(
            "DELETE FROM {} WHERE {} = ? AND {} IN ({})",
            self.accounts_table, self.money_column, self.name_column, placeholders
        )
    }
}
