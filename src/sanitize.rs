//! Column name sanitization and identifier quoting.
//!
//! Identifiers cannot be bound as statement parameters, so every table and
//! column name that reaches SQL text goes through [`quote_ident`], which only
//! accepts names matching `[A-Za-z_][A-Za-z0-9_]*`. This is the single place
//! where file-derived text is interpolated into SQL.
//!
//! [`sanitize_column`] turns arbitrary XER header text into a name that passes
//! that check; [`sanitize_field_list`] does the same for a whole `%F` line and
//! keeps the result unique within the line.

use crate::error::StoreError;

const SEPARATOR: char = '_';
const DIGIT_PREFIX: &str = "col_";
const MAX_IDENT_LEN: usize = 128;

/// Sanitize one raw field name found at `index` in its field list.
///
/// ```
/// use xer_ingest::sanitize::sanitize_column;
/// assert_eq!(sanitize_column("Task ID", 0), "Task_ID");
/// assert_eq!(sanitize_column("  ", 1), "col_1");
/// assert_eq!(sanitize_column("2nd Col", 2), "col_2nd_Col");
/// ```
pub fn sanitize_column(raw: &str, index: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return format!("col_{}", index);
    }

    let mut sanitized: String = trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == SEPARATOR {
                c
            } else {
                SEPARATOR
            }
        })
        .collect();

    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert_str(0, DIGIT_PREFIX);
    }

    if sanitized.len() > MAX_IDENT_LEN {
        sanitized.truncate(MAX_IDENT_LEN);
    }

    sanitized
}

/// Sanitize every name of a field list, disambiguating collisions.
///
/// Names are compared case-insensitively because the store treats column
/// names that way. The first occurrence keeps the bare name; later ones get
/// `_2`, `_3`, ... so no column silently shadows another. A suffixed name
/// still fits the identifier length limit; the base is shortened to make room.
pub fn sanitize_field_list<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut taken: Vec<String> = Vec::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());

    for (index, name) in raw.iter().enumerate() {
        let base = sanitize_column(name.as_ref(), index);
        let mut candidate = base.clone();
        let mut n = 2;
        while taken.iter().any(|t| t.eq_ignore_ascii_case(&candidate)) {
            candidate = with_suffix(&base, n);
            n += 1;
        }
        taken.push(candidate.clone());
        out.push(candidate);
    }

    out
}

/// `base` plus `_n`, cut so the whole name stays within [`MAX_IDENT_LEN`].
fn with_suffix(base: &str, n: usize) -> String {
    let suffix = format!("{}{}", SEPARATOR, n);
    // sanitized names are ASCII, so byte and char boundaries agree
    let keep = base.len().min(MAX_IDENT_LEN - suffix.len());
    format!("{}{}", &base[..keep], suffix)
}

/// True when `name` may be interpolated into SQL as an identifier.
pub fn is_safe_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == SEPARATOR => {}
        _ => return false,
    }
    name.len() <= MAX_IDENT_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == SEPARATOR)
}

/// Validate `name` and return it double-quoted for use in SQL text.
pub fn quote_ident(name: &str) -> Result<String, StoreError> {
    if is_safe_identifier(name) {
        Ok(format!("\"{}\"", name))
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}
