// Error types for the ingestion pipeline
//
// Field-level validation failures are NOT errors here: they are data
// (see validation::FieldError) and never abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Persistence-level failure raised by a PersistenceGateway
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to connect to store at {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// True when the underlying SQLite failure is a constraint violation
    /// (duplicate invoice number, missing company, ...)
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}

/// Feed-level failure: the input cannot be opened or split into rows
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open feed {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed feed at line {line}: {source}")]
    Csv {
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("Feed has no header row")]
    MissingHeader,
}

/// Fatal run-level failure
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Invalid configuration value read from the environment
#[derive(Error, Debug)]
#[error("Invalid value for {key}: {value:?} ({reason})")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}
