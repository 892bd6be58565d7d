use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn xer_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("xer");
    path
}

const SCHEDULE: &str = "ERMHDR\t19.12\t2024-03-15\tProject\tadmin\n\
%T\tPROJECT\n\
%F\tproj_id\tproj_short_name\n\
%R\t100\tPLANT\n\
%E\n\
%T\tTASK\n\
%F\ttask_id\tproj_id\ttask_name\n\
%R\t1\t100\tFoo\n\
%R\t2\t100\tBar\n\
%E\n\
%T\tMEMTYPE\n\
%F\tmemo_type_id\n\
%E\n";

const UPDATE: &str = "%T\tTASK\n\
%F\ttask_id\tproj_id\ttask_name\tstatus_code\n\
%R\t1\t100\tFoo\tTK_Complete\n\
%E\n";

fn setup_test_env() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("xer.toml");
    fs::write(
        &config_path,
        r#"[retry]
max_attempts = 3
backoff_step_ms = 10

[logging]
level = "warn"
"#,
    )
    .unwrap();

    let db_path = root.join("data").join("schedule.sqlite");
    (tmp, config_path, db_path)
}

fn run_xer(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = xer_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run xer binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path, db_path) = setup_test_env();

    let (stdout, stderr, success) = run_xer(&config_path, &["init", db_path.to_str().unwrap()]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(db_path.exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path, db_path) = setup_test_env();
    let db = db_path.to_str().unwrap();

    let (_, _, success1) = run_xer(&config_path, &["init", db]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_xer(&config_path, &["init", db]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_file() {
    let (tmp, config_path, db_path) = setup_test_env();
    let source = write_file(tmp.path(), "Plant_Baseline_2024-03-15_v1.xer", SCHEDULE);

    let (stdout, stderr, success) = run_xer(
        &config_path,
        &[
            "ingest",
            source.to_str().unwrap(),
            db_path.to_str().unwrap(),
        ],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("file_id: 1"));
    assert!(stdout.contains("tables processed: 2"));
    assert!(stdout.contains("rows inserted: 3"));
    assert!(stdout.contains("rows skipped: 0"));
    assert!(stdout.contains("ok"));
    assert!(source.exists(), "source must be kept without --remove-source");
}

#[test]
fn test_ingest_uses_original_filename_and_removes_source() {
    let (tmp, config_path, db_path) = setup_test_env();
    let source = write_file(tmp.path(), "upload-8c1e.tmp", SCHEDULE);
    let db = db_path.to_str().unwrap();

    let (stdout, stderr, success) = run_xer(
        &config_path,
        &[
            "ingest",
            source.to_str().unwrap(),
            db,
            "Plant_Update_20240401.xer",
            "--remove-source",
        ],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingest Plant_Update_20240401.xer"));
    assert!(!source.exists(), "source should be removed");

    let (stdout, _, success) = run_xer(&config_path, &["stats", db]);
    assert!(success);
    assert!(stdout.contains("Plant_Update_20240401.xer"));
    assert!(stdout.contains("2024-04-01 00:00:00"));
    assert!(stdout.contains("update"));
}

#[test]
fn test_second_file_widens_table() {
    let (tmp, config_path, db_path) = setup_test_env();
    let db = db_path.to_str().unwrap();
    let first = write_file(tmp.path(), "Plant_2024-03-15.xer", SCHEDULE);
    let second = write_file(tmp.path(), "Plant_2024-04-15.xer", UPDATE);

    let (_, _, ok1) = run_xer(&config_path, &["ingest", first.to_str().unwrap(), db]);
    assert!(ok1);
    let (stdout, stderr, ok2) = run_xer(&config_path, &["ingest", second.to_str().unwrap(), db]);
    assert!(ok2, "second ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("file_id: 2"));

    let (stdout, _, success) = run_xer(&config_path, &["stats", db]);
    assert!(success);
    assert!(stdout.contains("Files:       2"));
    let task_line = stdout
        .lines()
        .find(|l| l.trim_start().starts_with("TASK"))
        .unwrap_or_else(|| panic!("no TASK line in stats: {}", stdout));
    assert!(task_line.contains("1:2"), "unexpected TASK line: {}", task_line);
    assert!(task_line.contains("2:1"), "unexpected TASK line: {}", task_line);
}

#[test]
fn test_ingest_missing_source_fails() {
    let (tmp, config_path, db_path) = setup_test_env();
    let missing = tmp.path().join("missing.xer");

    let (_, stderr, success) = run_xer(
        &config_path,
        &["ingest", missing.to_str().unwrap(), db_path.to_str().unwrap()],
    );
    assert!(!success, "missing source must exit non-zero");
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_dir() {
    let (tmp, config_path, db_path) = setup_test_env();
    let exports = tmp.path().join("exports");
    fs::create_dir_all(exports.join("april")).unwrap();
    write_file(&exports, "a_2024-03-15.xer", SCHEDULE);
    write_file(&exports.join("april"), "b_2024-04-15.xer", UPDATE);
    write_file(&exports, "readme.txt", "not a schedule");

    let (stdout, stderr, success) = run_xer(
        &config_path,
        &["ingest-dir", exports.to_str().unwrap(), db_path.to_str().unwrap()],
    );
    assert!(success, "ingest-dir failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files: 2"));
    assert!(stdout.contains("failed: 0"));
}

#[test]
fn test_parse_only() {
    let (tmp, config_path, _db_path) = setup_test_env();
    let source = write_file(tmp.path(), "schedule.xer", SCHEDULE);

    let (stdout, _, success) = run_xer(&config_path, &["parse", source.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("tables: 3"));
    assert!(stdout.contains("total records: 3"));

    let (stdout, _, success) =
        run_xer(&config_path, &["parse", source.to_str().unwrap(), "--json"]);
    assert!(success);
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let tables = json["tables"].as_array().unwrap();
    assert_eq!(tables[1]["name"], "TASK");
    assert_eq!(tables[1]["columns"][2], "task_name");
}

#[test]
fn test_health() {
    let (_tmp, config_path, db_path) = setup_test_env();

    let (stdout, _, success) = run_xer(&config_path, &["health", db_path.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("healthy: true"));
}

#[test]
fn test_runs_without_config_file() {
    let (tmp, _config_path, db_path) = setup_test_env();
    let source = write_file(tmp.path(), "schedule.xer", SCHEDULE);
    let absent = tmp.path().join("no-such-config.toml");

    let (stdout, stderr, success) = run_xer(
        &absent,
        &["ingest", source.to_str().unwrap(), db_path.to_str().unwrap()],
    );
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("rows inserted: 3"));
}
