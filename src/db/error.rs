//! Database error types.

use derive_more::{Display, Error};
use diesel::result::DatabaseErrorKind;
use tracing::instrument;

/// Broad classification of a storage failure.
///
/// Only [`DbErrorKind::Unavailable`] causes the connection handle to be
/// discarded and replaced on the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DbErrorKind {
    /// The engine could not be reached or the handle is dead.
    #[display("storage unavailable")]
    Unavailable,
    /// A statement was rejected by the engine.
    #[display("query failed")]
    Query,
    /// A configured table or column name is not a plain SQL identifier.
    #[display("invalid schema name")]
    InvalidSchema,
}

/// Database error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Database error ({}): {} at {}:{}", kind, message, file, line)]
pub struct DbError {
    /// What kind of failure this is.
    pub kind: DbErrorKind,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl DbError {
    /// Creates a new database error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: DbErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Creates an [`DbErrorKind::Unavailable`] error.
    #[track_caller]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::Unavailable, message)
    }

    /// Creates a [`DbErrorKind::Query`] error.
    #[track_caller]
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(DbErrorKind::Query, message)
    }

    /// Returns true if the connection handle should be replaced.
    pub fn is_unavailable(&self) -> bool {
        self.kind == DbErrorKind::Unavailable
    }
}

impl From<diesel::result::Error> for DbError {
    #[track_caller]
    fn from(err: diesel::result::Error) -> Self {
        // Only a handle diesel reports as dead is Unavailable. Engine I/O
        // failures on a live handle surface as DatabaseError(Unknown) and stay
        // Query; the health probe's ping is what retires such a handle.
        let kind = match &err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::ClosedConnection, _)
            | diesel::result::Error::BrokenTransactionManager => DbErrorKind::Unavailable,
            _ => DbErrorKind::Query,
        };
        Self::new(kind, format!("Diesel error: {}", err))
    }
}

impl From<diesel::ConnectionError> for DbError {
    #[track_caller]
    fn from(err: diesel::ConnectionError) -> Self {
        Self::unavailable(format!("Connection error: {}", err))
    }
}
