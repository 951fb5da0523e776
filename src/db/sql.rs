//! Generic SQL implementation of [`AccountRepository`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use crate::db::schema::{PRUNE_BATCH_SIZE, Statements};
use crate::db::{
    Account, AccountRepository, ConnectionFactory, ConnectionSlot, DbError, HealthProbe, Identity,
    NoActivePlayers, PlayerPresence, ProbeOutcome, SaveOutcome, SchemaNames, SqlConnection,
    SqlParam,
};

/// Version written when a fresh connection finds no marker.
pub const INITIAL_SCHEMA_VERSION: i32 = 1;

/// Account repository over any engine reachable through a [`ConnectionFactory`].
///
/// All statements go through one mutex-guarded connection. The handle is
/// opened lazily, replaced after a connection-level failure, and can be
/// watched by a [`HealthProbe`].
pub struct SqlRepository<F: ConnectionFactory> {
    factory: F,
    names: SchemaNames,
    sql: Statements,
    default_balance: f64,
    presence: Arc<dyn PlayerPresence>,
    slot: Arc<ConnectionSlot>,
    probe: Mutex<Option<HealthProbe>>,
}

impl<F: ConnectionFactory + std::fmt::Debug> std::fmt::Debug for SqlRepository<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlRepository")
            .field("factory", &self.factory)
            .field("names", &self.names)
            .field("default_balance", &self.default_balance)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> SqlRepository<F> {
    /// Creates a repository. No connection is opened until first use.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DbErrorKind::InvalidSchema`] if any configured name
    /// is not a plain SQL identifier.
    #[instrument(skip(factory, names), fields(backend = factory.name()))]
    pub fn new(factory: F, names: SchemaNames) -> Result<Self, DbError> {
        names.validate()?;
        info!(accounts = %names.accounts_table(), "Creating SqlRepository");
        let sql = Statements::render(&names);
        Ok(Self {
            factory,
            names,
            sql,
            default_balance: 0.0,
            presence: Arc::new(NoActivePlayers),
            slot: Arc::new(ConnectionSlot::default()),
            probe: Mutex::new(None),
        })
    }

    /// Sets the starting balance that [`AccountRepository::clean`] prunes.
    pub fn with_default_balance(mut self, default_balance: f64) -> Self {
        self.default_balance = default_balance;
        self
    }

    /// Sets the source of truth for which players are online.
    pub fn with_presence(mut self, presence: impl PlayerPresence + 'static) -> Self {
        self.presence = Arc::new(presence);
        self
    }

    /// The configured table and column names.
    pub fn names(&self) -> &SchemaNames {
        &self.names
    }

    /// The engine-specific connection factory.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// The balance treated as "untouched" when pruning.
    pub fn default_balance(&self) -> f64 {
        self.default_balance
    }

    /// True while a connection handle is held.
    pub fn is_connected(&self) -> bool {
        self.slot.is_connected()
    }

    /// Starts the background health probe on the current tokio runtime.
    ///
    /// Replaces a probe that is already running.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DbErrorKind::Unavailable`] when called outside a
    /// tokio runtime.
    #[instrument(skip(self))]
    pub fn start_health_probe(&self, period: Duration) -> Result<(), DbError> {
        let runtime = Handle::try_current().map_err(|e| {
            DbError::unavailable(format!("Health probe needs a tokio runtime: {}", e))
        })?;
        self.start_health_probe_on(&runtime, period);
        Ok(())
    }

    /// Starts the background health probe on the given runtime.
    #[instrument(skip(self, runtime))]
    pub fn start_health_probe_on(&self, runtime: &Handle, period: Duration) {
        let probe = HealthProbe::spawn(runtime, Arc::downgrade(&self.slot), period);
        let previous = self
            .probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(probe);
        if previous.is_some() {
            debug!("Replaced running health probe");
        }
    }

    /// Stops the background health probe if one is running.
    #[instrument(skip(self))]
    pub fn stop_health_probe(&self) {
        if let Some(probe) = self
            .probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            probe.stop();
        }
    }

    /// True while a background probe task is alive.
    pub fn health_probe_running(&self) -> bool {
        self.probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(HealthProbe::is_running)
    }

    /// Interval of the running probe, if any.
    pub fn health_probe_period(&self) -> Option<Duration> {
        self.probe
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(HealthProbe::period)
    }

    /// Runs one probe tick synchronously.
    #[instrument(skip(self))]
    pub fn probe_now(&self) -> ProbeOutcome {
        self.slot.probe()
    }

    /// Runs `op` on a live connection, opening one first if needed.
    ///
    /// A connection-level failure from `op` empties the slot so the next call
    /// starts over with a fresh handle.
    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut dyn SqlConnection) -> Result<T, DbError>,
    ) -> Result<T, DbError> {
        let mut guard = self.slot.lock();
        if guard.is_none() {
            *guard = Some(self.open_connection()?);
        }
        let connection = guard
            .as_mut()
            .ok_or_else(|| DbError::unavailable("Connection slot empty after connect"))?;
        let result = op(&mut **connection);
        if let Err(e) = &result {
            if e.is_unavailable() {
                warn!(error = %e, backend = self.factory.name(), "Connection lost, will reconnect");
                *guard = None;
            }
        }
        result
    }

    /// Opens a connection and prepares it: tables exist and the version
    /// marker holds a row.
    #[instrument(skip(self), fields(backend = self.factory.name()))]
    fn open_connection(&self) -> Result<Box<dyn SqlConnection>, DbError> {
        let mut connection = self.factory.connect()?;
        if let Err(e) = self.prepare(connection.as_mut()) {
            if e.is_unavailable() {
                return Err(e);
            }
            warn!(error = %e, "Connection opened but preparation failed");
        }
        info!("Connected");
        Ok(connection)
    }

    fn prepare(&self, connection: &mut dyn SqlConnection) -> Result<(), DbError> {
        self.create_tables(connection)?;
        if connection.load_version(&self.sql.select_version)?.is_none() {
            info!(version = INITIAL_SCHEMA_VERSION, "Seeding version marker");
            self.write_version(connection, INITIAL_SCHEMA_VERSION)?;
        }
        Ok(())
    }

    fn create_tables(&self, connection: &mut dyn SqlConnection) -> Result<(), DbError> {
        connection.execute(&self.sql.create_accounts, &[])?;
        connection.execute(&self.sql.create_version, &[])?;
        Ok(())
    }

    fn write_version(&self, connection: &mut dyn SqlConnection, version: i32) -> Result<(), DbError> {
        connection.execute(&self.sql.clear_version, &[])?;
        connection.execute(&self.sql.insert_version, &[SqlParam::BigInt(i64::from(version))])?;
        Ok(())
    }
}

fn identity_param(identity: Identity<'_>) -> SqlParam {
    SqlParam::Text(identity.key().to_string())
}

impl<F: ConnectionFactory> AccountRepository for SqlRepository<F> {
    fn backend_name(&self) -> &str {
        self.factory.name()
    }

    fn supports_modification(&self) -> bool {
        self.factory.supports_modification()
    }

    #[instrument(skip(self), fields(backend = self.factory.name()))]
    fn init(&self) -> Result<(), DbError> {
        debug!("Bootstrapping schema");
        self.with_connection(|conn| self.create_tables(conn))?;
        info!("Schema ready");
        Ok(())
    }

    #[instrument(skip(self))]
    fn check_connection(&self) -> Result<(), DbError> {
        self.with_connection(|_| Ok(()))
    }

    #[instrument(skip(self))]
    fn version(&self) -> Result<Option<i32>, DbError> {
        let version = self.with_connection(|conn| conn.load_version(&self.sql.select_version))?;
        debug!(?version, "Version loaded");
        Ok(version)
    }

    #[instrument(skip(self))]
    fn set_version(&self, version: i32) -> Result<(), DbError> {
        self.with_connection(|conn| self.write_version(conn, version))?;
        info!(version, "Version stored");
        Ok(())
    }

    #[instrument(skip(self))]
    fn load_account(
        &self,
        name: &str,
        identifier: Option<&str>,
    ) -> Result<Option<Account>, DbError> {
        let identity = Identity::resolve(name, identifier);
        debug!(?identity, "Loading account");
        let rows = self.with_connection(|conn| {
            conn.load_accounts(self.sql.select_by(identity), &[identity_param(identity)])
        })?;
        if rows.len() > 1 {
            warn!(?identity, count = rows.len(), "Identity matches several rows, using the first");
        }
        Ok(rows.into_iter().next().map(Account::from))
    }

    #[instrument(skip(self))]
    fn accounts(&self) -> Result<Vec<Account>, DbError> {
        let rows = self.with_connection(|conn| conn.load_accounts(&self.sql.select_all, &[]))?;
        info!(count = rows.len(), "Accounts loaded");
        Ok(rows.into_iter().map(Account::from).collect())
    }

    #[instrument(skip(self))]
    fn top_accounts(&self, limit: usize) -> Result<Vec<Account>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.with_connection(|conn| {
            conn.load_accounts(&self.sql.select_top, &[SqlParam::BigInt(limit)])
        })?;
        debug!(count = rows.len(), "Top accounts loaded");
        Ok(rows.into_iter().map(Account::from).collect())
    }

    #[instrument(skip(self))]
    fn save_account(
        &self,
        name: &str,
        identifier: Option<&str>,
        balance: f64,
    ) -> Result<SaveOutcome, DbError> {
        let identity = Identity::resolve(name, identifier);
        // Both statements run under one lock, so writers on this repository
        // cannot interleave between the UPDATE and the INSERT.
        let outcome = self.with_connection(|conn| {
            let updated = conn.execute(
                self.sql.update_by(identity),
                &[
                    SqlParam::Double(balance),
                    SqlParam::Text(name.to_string()),
                    identity_param(identity),
                ],
            )?;
            if updated > 0 {
                return Ok(SaveOutcome::Updated(updated));
            }
            conn.execute(
                &self.sql.insert_account,
                &[
                    SqlParam::Text(name.to_string()),
                    SqlParam::NullableText(identifier.map(str::to_string)),
                    SqlParam::Double(balance),
                ],
            )?;
            Ok(SaveOutcome::Inserted)
        })?;
        debug!(?outcome, "Account saved");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    fn remove_account(&self, name: &str, identifier: Option<&str>) -> Result<usize, DbError> {
        let identity = Identity::resolve(name, identifier);
        let removed = self.with_connection(|conn| {
            conn.execute(self.sql.delete_by(identity), &[identity_param(identity)])
        })?;
        info!(?identity, removed, "Account removed");
        Ok(removed)
    }

    #[instrument(skip(self))]
    fn remove_all_accounts(&self) -> Result<usize, DbError> {
        let removed = self.with_connection(|conn| conn.execute(&self.sql.delete_all, &[]))?;
        info!(removed, "All accounts removed");
        Ok(removed)
    }

    #[instrument(skip(self), fields(default_balance = self.default_balance))]
    fn clean(&self) -> Result<usize, DbError> {
        let candidates = self.with_connection(|conn| {
            conn.load_accounts(
                &self.sql.select_by_balance,
                &[SqlParam::Double(self.default_balance)],
            )
        })?;

        // The presence check calls into the host, so it runs without the lock.
        let mut stale: Vec<String> = candidates
            .into_iter()
            .map(|row| row.account_name().clone())
            .filter(|name| !self.presence.is_active(name))
            .collect();
        stale.sort();
        stale.dedup();

        if stale.is_empty() {
            debug!("Nothing to prune");
            return Ok(0);
        }

        let removed = self.with_connection(|conn| {
            let mut removed = 0;
            for batch in stale.chunks(PRUNE_BATCH_SIZE) {
                let params: Vec<SqlParam> = std::iter::once(SqlParam::Double(self.default_balance))
                    .chain(batch.iter().cloned().map(SqlParam::Text))
                    .collect();
                removed += conn.execute(&self.sql.delete_names(batch.len()), &params)?;
            }
            Ok(removed)
        })?;
        info!(removed, "Pruned idle accounts");
        Ok(removed)
    }

    #[instrument(skip(self))]
    fn close(&self) {
        self.stop_health_probe();
        if self.slot.clear() {
            info!(backend = self.factory.name(), "Connection closed");
        }
    }
}

impl<F: ConnectionFactory> Drop for SqlRepository<F> {
    fn drop(&mut self) {
        self.stop_health_probe();
    }
}
