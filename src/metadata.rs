//! File metadata: derived from the upload's file name, stored once per run.
//!
//! The classifier is a heuristic over the name only; it never opens the file.

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};
use std::path::Path;
use std::sync::OnceLock;
use tracing::info;

use crate::error::StoreError;
use crate::migrate::ensure_metadata_table;
use crate::models::FileMetadata;
use crate::store::{SqlBackend, SqlParam};

/// Categories checked in order; the first whose keyword occurs wins.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("baseline", &["baseline", "base", "bl"]),
    ("current", &["current", "curr", "latest"]),
    ("update", &["update", "upd"]),
    ("forecast", &["forecast", "fc"]),
    ("schedule", &["schedule", "sched"]),
    ("design", &["design"]),
    ("construction", &["construction", "const"]),
];

struct Patterns {
    project: Regex,
    dates: Vec<(Regex, &'static str)>,
    versions: Vec<Regex>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static regex");
        let re_ci = |p: &str| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("static regex")
        };
        Patterns {
            project: re(r"^([A-Za-z0-9\s]+?)[-_]"),
            dates: vec![
                (re(r"(\d{4}-\d{2}-\d{2})"), "%Y-%m-%d"),
                (re(r"(\d{8})"), "%Y%m%d"),
                (re(r"(\d{2}-\d{2}-\d{4})"), "%m-%d-%Y"),
                (re(r"(\d{2}/\d{2}/\d{4})"), "%m/%d/%Y"),
            ],
            versions: vec![
                re_ci(r"v(\d+\.?\d*)"),
                re_ci(r"rev(\d+)"),
                re_ci(r"version(\d+\.?\d*)"),
            ],
        }
    })
}

/// Derive metadata from a file name such as `Plant_Baseline_2024-03-15_v2.xer`.
pub fn classify_filename(file_name: &str) -> FileMetadata {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_name.to_string());
    let p = patterns();

    let project_name = match p.project.captures(&stem) {
        Some(caps) => caps[1].trim().to_string(),
        None => stem.clone(),
    };

    let snapshot_date = p.dates.iter().find_map(|(re, format)| {
        let found = re.captures(&stem)?;
        NaiveDate::parse_from_str(&found[1], format)
            .ok()
            .map(|d| format!("{} 00:00:00", d.format("%Y-%m-%d")))
    });

    let bl_version = p
        .versions
        .iter()
        .find_map(|re| re.captures(&stem).map(|c| c[1].to_string()));

    let lower = stem.to_lowercase();
    let file_category = CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(category, _)| category.to_string());

    FileMetadata {
        file_name: file_name.to_string(),
        project_name: Some(project_name).filter(|n| !n.is_empty()),
        project_id: None,
        snapshot_date,
        file_category,
        bl_version,
    }
}

/// Insert the metadata row and return its generated `file_id`.
pub async fn insert_file_metadata<B: SqlBackend + ?Sized>(
    backend: &B,
    meta: &FileMetadata,
) -> Result<i64, StoreError> {
    ensure_metadata_table(backend).await?;

    let exec = backend
        .execute(
            r#"
            INSERT INTO file_metadata (file_name, project_name, project_id, snapshot_date, file_category, bl_version)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
            &[
                SqlParam::text(&meta.file_name),
                SqlParam::Text(meta.project_name.clone()),
                meta.project_id
                    .map(SqlParam::Integer)
                    .unwrap_or(SqlParam::Text(None)),
                SqlParam::Text(meta.snapshot_date.clone()),
                SqlParam::Text(meta.file_category.clone()),
                SqlParam::Text(meta.bl_version.clone()),
            ],
        )
        .await?;

    info!(file_name = %meta.file_name, file_id = exec.last_insert_id, "recorded file metadata");
    Ok(exec.last_insert_id)
}
