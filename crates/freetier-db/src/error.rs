use rusqlite::ErrorCode;

/// A transaction that could not commit. Whatever it wrote has been rolled back.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unique constraint violated: {0}")]
    Conflict(#[source] rusqlite::Error),

    #[error("database error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("no {table} row with id {id}")]
    MissingRow { table: &'static str, id: i64 },

    #[error("database lock poisoned: {0}")]
    Poisoned(String),
}

impl StorageError {
    /// True when a unique index rejected the write, e.g. two racing first
    /// votes for the same (user, tier) pair.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == ErrorCode::ConstraintViolation
                    && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY) =>
            {
                Self::Conflict(err)
            }
            _ => Self::Sqlite(err),
        }
    }
}

/// Failures of the vote and comment write path.
#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    /// Rejected before any storage access.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl CounterError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Storage(e) if e.is_conflict())
    }
}

impl From<rusqlite::Error> for CounterError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.into())
    }
}
