//! Ingestion pipeline orchestration.
//!
//! One run loads one XER file: classify the file name → parse the file →
//! record a `file_metadata` row → for every table with records, reconcile
//! the destination schema and insert each record stamped with the new
//! `file_id`.
//!
//! A parse failure or a failed metadata insert aborts the run. Everything
//! after that is contained: a table that cannot be reconciled is reported
//! as failed and the next table proceeds; a record that cannot be inserted
//! is reported as skipped and the next record proceeds. The returned
//! [`IngestReport`] says exactly what was dropped and why.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::discover;
use crate::error::IngestError;
use crate::metadata::{classify_filename, insert_file_metadata};
use crate::models::{Record, TableBlock};
use crate::parser::parse_file;
use crate::retry::{RetryPolicy, RetryingExecutor};
use crate::sanitize::quote_ident;
use crate::schema::{ensure_schema, with_file_id, SchemaReport, FILE_ID_COLUMN};
use crate::store::{SqlBackend, SqlParam, Store};

/// Caller-supplied details for one run.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Name to classify and record instead of the source path's file name,
    /// e.g. the client's upload name when `source` is a temp file.
    pub original_name: Option<String>,
    pub project_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSkip {
    /// Zero-based position of the record within its table block.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Inserted {
        inserted: usize,
        skipped: Vec<RecordSkip>,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: String,
    pub schema: Option<SchemaReport>,
    pub outcome: TableOutcome,
}

impl TableReport {
    pub fn inserted(&self) -> usize {
        match &self.outcome {
            TableOutcome::Inserted { inserted, .. } => *inserted,
            TableOutcome::Failed { .. } => 0,
        }
    }

    pub fn skipped(&self) -> &[RecordSkip] {
        match &self.outcome {
            TableOutcome::Inserted { skipped, .. } => skipped,
            TableOutcome::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, TableOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub file_id: i64,
    pub file_name: String,
    pub tables: Vec<TableReport>,
}

impl IngestReport {
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn rows_inserted(&self) -> usize {
        self.tables.iter().map(TableReport::inserted).sum()
    }

    pub fn rows_skipped(&self) -> usize {
        self.tables.iter().map(|t| t.skipped().len()).sum()
    }

    pub fn tables_failed(&self) -> usize {
        self.tables.iter().filter(|t| t.is_failed()).count()
    }
}

/// Ingest one XER file and return the report for the new `file_id`.
pub async fn ingest<B: SqlBackend + ?Sized>(
    backend: &B,
    policy: RetryPolicy,
    source: &Path,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError> {
    let file_name = options.original_name.clone().unwrap_or_else(|| {
        source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.display().to_string())
    });

    let mut meta = classify_filename(&file_name);
    meta.project_id = options.project_id;
    info!(
        file_name = %file_name,
        project = ?meta.project_name,
        snapshot_date = ?meta.snapshot_date,
        category = ?meta.file_category,
        version = ?meta.bl_version,
        "classified file"
    );

    let registry = parse_file(source)?;

    let executor = RetryingExecutor::new(backend, policy);
    let file_id = insert_file_metadata(&executor, &meta)
        .await
        .map_err(IngestError::Metadata)?;

    let mut tables = Vec::new();
    for block in registry.iter() {
        if block.records.is_empty() {
            debug!(table = %block.name, "no records, skipping table");
            continue;
        }
        tables.push(insert_table(&executor, block, file_id).await);
    }

    let report = IngestReport {
        file_id,
        file_name,
        tables,
    };
    info!(
        file_id,
        tables = report.tables.len(),
        inserted = report.rows_inserted(),
        skipped = report.rows_skipped(),
        tables_failed = report.tables_failed(),
        "ingestion complete"
    );
    Ok(report)
}

async fn insert_table<B: SqlBackend + ?Sized>(
    executor: &B,
    block: &TableBlock,
    file_id: i64,
) -> TableReport {
    let table = block.name.clone();
    info!(table = %table, records = block.records.len(), "inserting table");

    let schema = match ensure_schema(executor, &block.name, &block.columns).await {
        Ok(report) => report,
        Err(e) => {
            error!(table = %table, error = %e, "schema reconciliation failed, skipping table");
            return TableReport {
                table,
                schema: None,
                outcome: TableOutcome::Failed {
                    reason: e.to_string(),
                },
            };
        }
    };

    let columns = with_file_id(&block.columns);
    let insert_sql = match build_insert(&block.name, &columns) {
        Ok(sql) => sql,
        Err(e) => {
            error!(table = %table, error = %e, "cannot build insert, skipping table");
            return TableReport {
                table,
                schema: Some(schema),
                outcome: TableOutcome::Failed {
                    reason: e.to_string(),
                },
            };
        }
    };

    let mut inserted = 0usize;
    let mut skipped = Vec::new();

    for (index, record) in block.records.iter().enumerate() {
        let params = row_params(record, &columns, file_id);
        match executor.execute(&insert_sql, &params).await {
            Ok(_) => inserted += 1,
            Err(e) => {
                if skipped.is_empty() {
                    let listing: Vec<String> = columns
                        .iter()
                        .zip(params.iter())
                        .map(|(c, v)| format!("{}={}", c, v))
                        .collect();
                    error!(
                        table = %table,
                        record = index,
                        error = %e,
                        sql = %insert_sql,
                        schema_failed = ?schema.failed,
                        values = %listing.join(", "),
                        "failed to insert record"
                    );
                } else {
                    warn!(table = %table, record = index, error = %e, "failed to insert record");
                }
                skipped.push(RecordSkip {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(table = %table, inserted, skipped = skipped.len(), "inserted records");

    TableReport {
        table,
        schema: Some(schema),
        outcome: TableOutcome::Inserted { inserted, skipped },
    }
}

fn build_insert(table: &str, columns: &[String]) -> Result<String, crate::error::StoreError> {
    let quoted = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>, _>>()?;
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table)?,
        quoted.join(", "),
        placeholders
    ))
}

/// Values for `columns` in order, with the stamped id in the `file_id` slot.
fn row_params(record: &Record, columns: &[String], file_id: i64) -> Vec<SqlParam> {
    // Records normally carry their fields in column order; fall back to a
    // name lookup when an earlier field list left them shifted.
    let in_order = record
        .fields
        .iter()
        .zip(columns.iter())
        .all(|((name, _), column)| name == column);

    let by_name: HashMap<&str, &Option<String>> = if in_order {
        HashMap::new()
    } else {
        record
            .fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
            .collect()
    };

    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            if column.eq_ignore_ascii_case(FILE_ID_COLUMN) {
                return SqlParam::Integer(file_id);
            }
            let value = if in_order {
                record.fields.get(i).and_then(|(_, v)| v.clone())
            } else {
                by_name.get(column.as_str()).and_then(|v| (*v).clone())
            };
            SqlParam::Text(value)
        })
        .collect()
}

/// `xer ingest`: load one file and print a summary.
pub async fn run_ingest(
    config: &Config,
    source: &Path,
    options: &IngestOptions,
    remove_source: bool,
) -> Result<IngestReport> {
    let store = Store::connect(&config.db).await?;
    let policy = RetryPolicy::from(&config.retry);

    let result = ingest(&store, policy, source, options).await;
    store.close().await;
    let report = result.with_context(|| format!("Failed to ingest {}", source.display()))?;

    print_report(&report);

    if remove_source {
        match std::fs::remove_file(source) {
            Ok(()) => info!(path = %source.display(), "removed source file"),
            Err(e) => warn!(path = %source.display(), error = %e, "could not remove source file"),
        }
    }

    println!("ok");
    Ok(report)
}

/// `xer ingest-dir`: load every matching file under `dir`, one run each.
pub async fn run_ingest_dir(config: &Config, dir: &Path) -> Result<()> {
    let files = discover::find_xer_files(dir, &config.ingest.include_globs)?;
    info!(dir = %dir.display(), files = files.len(), "discovered XER files");

    let store = Store::connect(&config.db).await?;
    let policy = RetryPolicy::from(&config.retry);
    let mut failed = 0usize;

    for path in &files {
        match ingest(&store, policy, path, &IngestOptions::default()).await {
            Ok(report) => print_report(&report),
            Err(e) => {
                failed += 1;
                error!(path = %path.display(), error = %e, "ingestion failed");
                println!("ingest {}", path.display());
                println!("  failed: {}", e);
            }
        }
    }

    store.close().await;

    println!("files: {}", files.len());
    println!("failed: {}", failed);
    if failed > 0 {
        anyhow::bail!("{} of {} files failed to ingest", failed, files.len());
    }
    println!("ok");
    Ok(())
}

/// `xer parse`: parse without touching a store.
pub fn run_parse(source: &Path, json: bool) -> Result<()> {
    let registry = parse_file(source)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&registry)?);
        return Ok(());
    }

    println!("parse {}", source.display());
    println!("  tables: {}", registry.len());
    for block in registry.iter() {
        println!(
            "  {:<24} {:>4} columns {:>8} records",
            block.name,
            block.columns.len(),
            block.records.len()
        );
    }
    println!("  total records: {}", registry.total_records());
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!("ingest {}", report.file_name);
    println!("  file_id: {}", report.file_id);
    println!("  tables processed: {}", report.tables.len());
    println!("  rows inserted: {}", report.rows_inserted());
    println!("  rows skipped: {}", report.rows_skipped());
    println!("  tables failed: {}", report.tables_failed());
}
