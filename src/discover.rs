use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find files under `root` matching `include_globs`, sorted by path.
pub fn find_xer_files(root: &Path, include_globs: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Directory does not exist: {}", root.display());
    }

    let include_set = build_globset(include_globs)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if include_set.is_match(&rel_str) {
            files.push(path.to_path_buf());
        }
    }

    // Sort for deterministic ordering
    files.sort();
    files.dedup();

    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
