pub mod repository;
pub mod sqlite;

pub use repository::*;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// SQLite reported `SQLITE_CONSTRAINT_UNIQUE`; callers remap this to a domain error.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Internal lock error")]
    LockPoisoned,
}

impl DatabaseError {
    /// Classify a write error, splitting unique-index violations out of the generic bucket.
    pub fn from_write(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, message)
                if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                Self::UniqueViolation(
                    message
                        .clone()
                        .unwrap_or_else(|| "UNIQUE constraint failed".to_string()),
                )
            }
            _ => Self::Sqlite(err),
        }
    }
}
