//! Engine seam: connection factories, live handles, and the guarded slot that
//! foreground calls and the health probe share.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::{debug, instrument, warn};

use crate::db::{AccountRow, DbError};

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Non-null text.
    Text(String),
    /// Text that may be NULL.
    NullableText(Option<String>),
    /// Double-precision float.
    Double(f64),
    /// 64-bit integer.
    BigInt(i64),
}

/// A live link to a storage engine.
///
/// Implemented once per engine. Statement text is always produced by the
/// SQL repository; the engine only binds, runs, and maps rows.
pub trait SqlConnection: Send {
    /// Runs a statement and returns the affected-row count.
    fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<usize, DbError>;

    /// Runs a query whose columns are aliased to [`AccountRow`]'s fields.
    fn load_accounts(&mut self, sql: &str, params: &[SqlParam]) -> Result<Vec<AccountRow>, DbError>;

    /// Runs a query returning at most one `version` column.
    fn load_version(&mut self, sql: &str) -> Result<Option<i32>, DbError>;

    /// Trivial round trip used to detect a silently dead handle.
    fn ping(&mut self) -> Result<(), DbError>;
}

/// Produces connections for one engine.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Identifying name for diagnostics and backend selection.
    fn name(&self) -> &str;

    /// Whether the engine can alter existing tables in place.
    fn supports_modification(&self) -> bool;

    /// Opens a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns an [`crate::DbErrorKind::Unavailable`] error when the engine
    /// cannot be reached.
    fn connect(&self) -> Result<Box<dyn SqlConnection>, DbError>;
}

/// What one health-probe tick observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// No handle was open, nothing to check.
    Idle,
    /// A foreground call held the handle; the tick was skipped.
    Busy,
    /// The ping succeeded.
    Healthy,
    /// The ping failed and the handle was dropped for replacement.
    Dropped,
}

/// The single connection handle owned by a repository.
///
/// Empty means `DISCONNECTED`, occupied means `CONNECTED`.
#[derive(Default)]
pub(crate) struct ConnectionSlot {
    handle: Mutex<Option<Box<dyn SqlConnection>>>,
}

impl std::fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connected = match self.handle.try_lock() {
            Ok(guard) => Some(guard.is_some()),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner().is_some()),
            Err(TryLockError::WouldBlock) => None,
        };
        f.debug_struct("ConnectionSlot")
            .field("connected", &connected)
            .finish()
    }
}

impl ConnectionSlot {
    /// Locks the slot. A panic in another holder does not poison it for us.
    pub fn lock(&self) -> MutexGuard<'_, Option<Box<dyn SqlConnection>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Drops the handle, if any. Returns whether one was open.
    pub fn clear(&self) -> bool {
        self.lock().take().is_some()
    }

    /// One probe tick: ping the open handle without waiting on foreground work.
    #[instrument(skip(self))]
    pub fn probe(&self) -> ProbeOutcome {
        let mut guard = match self.handle.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("Connection busy, skipping probe");
                return ProbeOutcome::Busy;
            }
        };
        let Some(connection) = guard.as_mut() else {
            return ProbeOutcome::Idle;
        };
        match connection.ping() {
            Ok(()) => {
                debug!("Connection healthy");
                ProbeOutcome::Healthy
            }
            Err(e) => {
                warn!(error = %e, "Health probe failed, dropping connection");
                *guard = None;
                ProbeOutcome::Dropped
            }
        }
    }
}
