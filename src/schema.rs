//! Destination schema reconciliation.
//!
//! A destination table holds every column ever seen for its name across all
//! ingested files, plus `file_id`. [`ensure_schema`] creates the table when
//! it is missing and adds any required column it lacks. Columns are never
//! dropped or retyped, and every data column is `TEXT`.
//!
//! Column names are compared case-insensitively, as SQLite does.

use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::sanitize::quote_ident;
use crate::store::{SqlBackend, SqlParam};

/// Column stamped with the owning `file_metadata.file_id` on every row.
pub const FILE_ID_COLUMN: &str = "file_id";

/// What one [`ensure_schema`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub created: bool,
    pub added: Vec<String>,
    /// Columns that could not be added, with the reason.
    pub failed: Vec<(String, String)>,
}

impl SchemaReport {
    pub fn is_unchanged(&self) -> bool {
        !self.created && self.added.is_empty() && self.failed.is_empty()
    }
}

/// `columns` plus `file_id` when no column of that name is present.
pub fn with_file_id(columns: &[String]) -> Vec<String> {
    let mut out = columns.to_vec();
    if !contains_ci(&out, FILE_ID_COLUMN) {
        out.push(FILE_ID_COLUMN.to_string());
    }
    out
}

fn contains_ci(columns: &[String], name: &str) -> bool {
    columns.iter().any(|c| c.eq_ignore_ascii_case(name))
}

fn column_type(name: &str) -> &'static str {
    if name.eq_ignore_ascii_case(FILE_ID_COLUMN) {
        "INTEGER"
    } else {
        "TEXT"
    }
}

/// Current column names of `table`; empty when the table does not exist.
pub async fn table_columns<B: SqlBackend + ?Sized>(
    backend: &B,
    table: &str,
) -> Result<Vec<String>, StoreError> {
    let rows = backend
        .query(
            "SELECT name FROM pragma_table_info(?) ORDER BY cid",
            &[SqlParam::text(table)],
        )
        .await?;
    Ok(rows.first_column())
}

/// Make `table` exist with at least `required` columns and `file_id`.
///
/// Idempotent. A column that cannot be added is recorded in
/// [`SchemaReport::failed`] and does not stop the others. Fails only when
/// the table name is not a safe identifier or the store cannot be reached.
pub async fn ensure_schema<B: SqlBackend + ?Sized>(
    backend: &B,
    table: &str,
    required: &[String],
) -> Result<SchemaReport, StoreError> {
    let quoted_table = quote_ident(table)?;
    let required = with_file_id(required);
    let mut report = SchemaReport::default();

    let mut existing = table_columns(backend, table).await?;

    if existing.is_empty() {
        let mut defs = Vec::with_capacity(required.len());
        for column in &required {
            match quote_ident(column) {
                Ok(quoted) => defs.push(format!("{} {}", quoted, column_type(column))),
                Err(e) => report.failed.push((column.clone(), e.to_string())),
            }
        }

        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quoted_table,
            defs.join(", ")
        );
        backend.execute(&create_sql, &[]).await?;
        report.created = true;
        info!(table, columns = defs.len(), "created table");

        existing = table_columns(backend, table).await?;
    }

    let missing: Vec<&String> = required
        .iter()
        .filter(|c| !contains_ci(&existing, c))
        .filter(|c| !report.failed.iter().any(|(f, _)| f == *c))
        .collect();

    if missing.is_empty() {
        debug!(table, "all required columns present");
        return Ok(report);
    }

    info!(table, missing = missing.len(), "adding missing columns");

    for column in missing {
        let quoted = match quote_ident(column) {
            Ok(q) => q,
            Err(e) => {
                warn!(table, column = %column, error = %e, "skipping column");
                report.failed.push((column.clone(), e.to_string()));
                continue;
            }
        };

        let alter_sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quoted_table,
            quoted,
            column_type(column)
        );

        match backend.execute(&alter_sql, &[]).await {
            Ok(_) => {
                info!(table, column = %column, "added column");
                report.added.push(column.clone());
            }
            // Another ingester added it first.
            Err(StoreError::Database(msg)) if msg.contains("duplicate column name") => {
                debug!(table, column = %column, "column already added concurrently");
            }
            Err(e) => {
                warn!(table, column = %column, error = %e, "failed to add column");
                report.failed.push((column.clone(), e.to_string()));
            }
        }
    }

    Ok(report)
}
