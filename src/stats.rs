//! Database statistics overview.
//!
//! Lists the ingested files and how many rows each destination table holds,
//! per file. Used by `xer stats` to audit what a run actually wrote.

use anyhow::Result;
use tracing::warn;

use crate::config::Config;
use crate::error::StoreError;
use crate::sanitize::quote_ident;
use crate::schema::{table_columns, FILE_ID_COLUMN};
use crate::store::{RowSet, SqlBackend, Store};

/// Row counts for one destination table.
pub struct TableStats {
    pub table: String,
    pub total: i64,
    /// `(file_id, rows)` ordered by file id.
    pub per_file: Vec<(i64, i64)>,
}

/// Count rows per `file_id` in every table that carries a `file_id` column.
pub async fn collect_table_stats<B: SqlBackend + ?Sized>(backend: &B) -> Result<Vec<TableStats>> {
    let tables = backend
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name <> 'file_metadata' ORDER BY name",
            &[],
        )
        .await?
        .first_column();

    let mut stats = Vec::new();
    for table in tables {
        let columns = table_columns(backend, &table).await?;
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(FILE_ID_COLUMN)) {
            continue;
        }
        let Ok(quoted) = quote_ident(&table) else {
            continue;
        };

        let rows = backend
            .query(
                &format!(
                    "SELECT file_id, COUNT(*) FROM {} GROUP BY file_id ORDER BY file_id",
                    quoted
                ),
                &[],
            )
            .await?;

        let per_file: Vec<(i64, i64)> = rows
            .rows
            .iter()
            .filter_map(|r| {
                let id = r.first()?.as_deref()?.parse().ok()?;
                let n = r.get(1)?.as_deref()?.parse().ok()?;
                Some((id, n))
            })
            .collect();

        stats.push(TableStats {
            total: per_file.iter().map(|(_, n)| n).sum(),
            table,
            per_file,
        });
    }

    Ok(stats)
}

/// Rows of `file_metadata`, or none when the table has not been created yet.
pub async fn list_files<B: SqlBackend + ?Sized>(backend: &B) -> Result<RowSet, StoreError> {
    match backend
        .query(
            "SELECT file_id, file_name, snapshot_date, file_category, bl_version FROM file_metadata ORDER BY file_id",
            &[],
        )
        .await
    {
        Err(StoreError::Database(msg)) if msg.contains("no such table") => Ok(RowSet::default()),
        other => other,
    }
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = Store::connect(&config.db).await?;

    let files = match list_files(&store).await {
        Ok(files) => files,
        Err(e) => {
            warn!(error = %e, "could not read file_metadata");
            RowSet::default()
        }
    };

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("XER Ingest - Database Stats");
    println!("===========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Files:       {}", files.rows.len());

    if !files.rows.is_empty() {
        println!();
        println!(
            "  {:>7}  {:<40} {:<20} {:<12} {}",
            "FILE_ID", "FILE", "SNAPSHOT", "CATEGORY", "VERSION"
        );
        println!("  {}", "-".repeat(92));
        for row in &files.rows {
            let cell = |i: usize| row.get(i).cloned().flatten().unwrap_or_else(|| "-".to_string());
            println!(
                "  {:>7}  {:<40} {:<20} {:<12} {}",
                cell(0),
                cell(1),
                cell(2),
                cell(3),
                cell(4)
            );
        }
    }

    let tables = collect_table_stats(&store).await?;
    if !tables.is_empty() {
        println!();
        println!("  {:<24} {:>10}   {}", "TABLE", "ROWS", "BY FILE_ID");
        println!("  {}", "-".repeat(60));
        for t in &tables {
            let by_file: Vec<String> = t
                .per_file
                .iter()
                .map(|(id, n)| format!("{}:{}", id, n))
                .collect();
            println!("  {:<24} {:>10}   {}", t.table, t.total, by_file.join(" "));
        }
    }

    println!();

    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::temp_store;
    use crate::store::SqlParam;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[tokio::test]
    async fn fresh_database_lists_no_files() {
        let (_tmp, store) = temp_store().await;
        let files = list_files(&store).await.unwrap();
        assert!(files.rows.is_empty());
    }

    #[tokio::test]
    async fn other_query_errors_are_not_hidden() {
        let (_tmp, store) = temp_store().await;
        store
            .execute("CREATE VIEW file_metadata AS SELECT 1 AS file_id", &[])
            .await
            .unwrap();

        let err = list_files(&store).await.unwrap_err();
        assert!(matches!(err, StoreError::Database(ref m) if m.contains("no such column")));
    }

    #[tokio::test]
    async fn counts_rows_per_file() {
        let (_tmp, store) = temp_store().await;
        store
            .execute("CREATE TABLE TASK (task_id TEXT, file_id INTEGER)", &[])
            .await
            .unwrap();
        store
            .execute("CREATE TABLE unrelated (x TEXT)", &[])
            .await
            .unwrap();
        for id in [1, 1, 2] {
            store
                .execute(
                    "INSERT INTO TASK (task_id, file_id) VALUES ('t', ?)",
                    &[SqlParam::Integer(id)],
                )
                .await
                .unwrap();
        }

        let stats = collect_table_stats(&store).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].table, "TASK");
        assert_eq!(stats[0].total, 3);
        assert_eq!(stats[0].per_file, vec![(1, 2), (2, 1)]);
    }
}
