//! Destination store handle and the statement interface the pipeline uses.
//!
//! [`Store`] owns a pooled SQLite connection set. It is built once by the
//! caller, passed by reference into the pipeline, and closed at the end:
//!
//! 1. [`Store::connect`] opens (or creates) the database file.
//! 2. Each statement acquires a pooled connection and releases it when done.
//! 3. [`Store::close`] waits for connections to be returned and shuts down.
//!
//! The reconciler, retrying executor and orchestrator only see the
//! [`SqlBackend`] trait, so tests can substitute a scripted backend.

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

use crate::config::DbConfig;
use crate::error::StoreError;

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(Option<String>),
    Integer(i64),
}

impl SqlParam {
    pub fn text(value: impl Into<String>) -> Self {
        SqlParam::Text(Some(value.into()))
    }
}

impl std::fmt::Display for SqlParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlParam::Text(Some(v)) => write!(f, "{:?}", v),
            SqlParam::Text(None) => write!(f, "NULL"),
            SqlParam::Integer(n) => write!(f, "{}", n),
        }
    }
}

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Execution {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}

/// Result of a query. Every cell is read back as optional text.
///
/// `columns` is empty when the query returned no rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    /// Values of the first column, skipping NULLs.
    pub fn first_column(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|r| r.first().cloned().flatten())
            .collect()
    }
}

/// Statement execution against the destination store.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Execution, StoreError>;

    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet, StoreError>;
}

/// Pooled SQLite store.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
        let db_path = &config.path;

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Connect(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
            .map_err(|e| StoreError::Connect(e.to_string()))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        Ok(Self { pool })
    }

    /// `SELECT 1` round trip. Never fails; any error reads as unhealthy.
    pub async fn health_check(&self) -> bool {
        match self.query("SELECT 1 AS status", &[]).await {
            Ok(rows) => rows.first_column().first().map(String::as_str) == Some("1"),
            Err(e) => {
                tracing::warn!(error = %e, "database health check failed");
                false
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &'q [SqlParam]) -> SqliteQuery<'q> {
    for param in params {
        query = match param {
            SqlParam::Text(v) => query.bind(v.as_deref()),
            SqlParam::Integer(n) => query.bind(*n),
        };
    }
    query
}

fn cell_text(row: &SqliteRow, index: usize) -> Option<String> {
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v;
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map(|n| n.to_string());
    }
    None
}

#[async_trait]
impl SqlBackend for Store {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<Execution, StoreError> {
        let result = bind_all(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;

        Ok(Execution {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_rowid(),
        })
    }

    async fn query(&self, sql: &str, params: &[SqlParam]) -> Result<RowSet, StoreError> {
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;

        let columns = rows
            .first()
            .map(|r| r.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| cell_text(row, i)).collect())
            .collect();

        Ok(RowSet { columns, rows })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_store;
    use super::*;

    #[tokio::test]
    async fn health_check_passes_on_open_store() {
        let (_tmp, store) = temp_store().await;
        assert!(store.health_check().await);
        store.close().await;
        assert!(!store.health_check().await);
    }

    #[tokio::test]
    async fn execute_and_query_round_trip() {
        let (_tmp, store) = temp_store().await;
        store
            .execute("CREATE TABLE t (a TEXT, n INTEGER)", &[])
            .await
            .unwrap();
        let exec = store
            .execute(
                "INSERT INTO t (a, n) VALUES (?, ?)",
                &[SqlParam::Text(None), SqlParam::Integer(4)],
            )
            .await
            .unwrap();
        assert_eq!(exec.rows_affected, 1);
        assert_eq!(exec.last_insert_id, 1);

        let rows = store.query("SELECT a, n FROM t", &[]).await.unwrap();
        assert_eq!(rows.columns, vec!["a", "n"]);
        assert_eq!(rows.rows, vec![vec![None, Some("4".to_string())]]);
    }

    #[tokio::test]
    async fn bad_sql_is_not_transient() {
        let (_tmp, store) = temp_store().await;
        let err = store.execute("INSERT INTO missing VALUES (1)", &[]).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
