//! Error types for parsing and storage.
//!
//! Command-level code works in `anyhow::Result`; the pipeline stages return
//! these typed errors so callers can tell a transient lock from a real
//! failure, and a missing file from a broken one.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while reading an XER file. Always fatal for the run.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("XER file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The path exists but could not be opened (permissions, not a file, ...).
    #[error("XER file unreadable: {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read XER file at line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Failure reported by the destination store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store is busy or locked by another writer. Worth retrying.
    #[error("database busy: {0}")]
    Busy(String),

    #[error("database error: {0}")]
    Database(String),

    /// An identifier failed the allow-list check and was never sent to the store.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("failed to open database: {0}")]
    Connect(String),
}

/// Failure that aborts a whole ingestion run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("failed to record file metadata: {0}")]
    Metadata(#[source] StoreError),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }
}

const SQLITE_BUSY: i64 = 5;
const SQLITE_LOCKED: i64 = 6;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                // Extended result codes keep the primary code in the low byte.
                let primary = db_err
                    .code()
                    .and_then(|c| c.parse::<i64>().ok())
                    .map(|c| c & 0xff);
                let locked = matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
                    || is_lock_message(&message);
                if locked {
                    StoreError::Busy(message)
                } else {
                    StoreError::Database(message)
                }
            }
            other => {
                let message = other.to_string();
                if is_lock_message(&message) {
                    StoreError::Busy(message)
                } else {
                    StoreError::Database(message)
                }
            }
        }
    }
}

fn is_lock_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("database is locked") || lower.contains("database table is locked")
}
