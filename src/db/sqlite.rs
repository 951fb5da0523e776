//! Embedded SQLite engine.

use std::path::{Path, PathBuf};

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_types::{BigInt, Double, Nullable, Text};
use diesel::sqlite::Sqlite;
use tokio::runtime::Handle;
use tracing::{debug, info, instrument};

use crate::db::{
    AccountRow, ConnectionFactory, DbError, SqlConnection, SqlParam, SqlRepository, VersionRow,
};
use crate::StorageConfig;

/// File name of the database inside the host data directory.
pub const DATABASE_FILE: &str = "database.db";

/// Opens connections to a single local database file.
#[derive(Debug, Clone)]
pub struct SqliteFactory {
    database_path: PathBuf,
}

impl SqliteFactory {
    /// Creates a factory for `<data_dir>/database.db`.
    ///
    /// The directory is owned by the host and is not created here.
    #[instrument(skip(data_dir), fields(data_dir = %data_dir.as_ref().display()))]
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let database_path = data_dir.as_ref().join(DATABASE_FILE);
        debug!(path = %database_path.display(), "Creating SqliteFactory");
        Self { database_path }
    }

    /// Full path of the database file.
    pub fn database_path(&self) -> &Path {
        &self.database_path
    }
}

impl ConnectionFactory for SqliteFactory {
    fn name(&self) -> &str {
        "SQLite"
    }

    fn supports_modification(&self) -> bool {
        false
    }

    #[instrument(skip(self), fields(path = %self.database_path.display()))]
    fn connect(&self) -> Result<Box<dyn SqlConnection>, DbError> {
        let url = self.database_path.to_str().ok_or_else(|| {
            DbError::unavailable(format!(
                "Database path is not valid UTF-8: {}",
                self.database_path.display()
            ))
        })?;
        let connection = SqliteConnection::establish(url).map_err(|e| {
            DbError::unavailable(format!("Failed to connect to '{}': {}", url, e))
        })?;
        info!("SQLite connection established");
        Ok(Box::new(connection))
    }
}

impl SqlRepository<SqliteFactory> {
    /// Builds an embedded repository from storage configuration.
    ///
    /// When called inside a tokio runtime the health probe is started with
    /// the configured period. Without a runtime the repository still works,
    /// but dead handles are only noticed by foreground calls.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DbErrorKind::InvalidSchema`] if a configured name is
    /// not a plain identifier.
    #[instrument(skip(config), fields(data_dir = %config.data_dir().display()))]
    pub fn sqlite(config: &StorageConfig) -> Result<Self, DbError> {
        let factory = SqliteFactory::new(config.data_dir());
        let repository = SqlRepository::new(factory, config.schema().clone())?
            .with_default_balance(*config.default_balance());
        match Handle::try_current() {
            Ok(runtime) => repository.start_health_probe_on(&runtime, config.health_probe_period()),
            Err(_) => debug!("No tokio runtime, health probe not started"),
        }
        Ok(repository)
    }
}

fn bind(sql: &str, params: &[SqlParam]) -> BoxedSqlQuery<'static, Sqlite, SqlQuery> {
    let query: BoxedSqlQuery<'static, Sqlite, SqlQuery> = diesel::sql_query(sql).into_boxed();
    params.iter().fold(query, |query, param| match param {
        SqlParam::Text(value) => query.bind::<Text, _>(value.clone()),
        SqlParam::NullableText(value) => query.bind::<Nullable<Text>, _>(value.clone()),
        SqlParam::Double(value) => query.bind::<Double, _>(*value),
        SqlParam::BigInt(value) => query.bind::<BigInt, _>(*value),
    })
}

impl SqlConnection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<usize, DbError> {
        Ok(bind(sql, params).execute(self)?)
    }

    fn load_accounts(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<AccountRow>, DbError> {
        Ok(bind(sql, params).load::<AccountRow>(self)?)
    }

    fn load_version(&mut self, sql: &str) -> Result<Option<i32>, DbError> {
        let rows = diesel::sql_query(sql).load::<VersionRow>(self)?;
        Ok(rows.first().map(|row| row.version))
    }

    fn ping(&mut self) -> Result<(), DbError> {
        Ok(self.batch_execute("/* ping */ SELECT 1")?)
    }
}
