//! Streaming XER parser.
//!
//! XER is line oriented. Each structural line starts with a two character
//! marker and carries tab separated fields after it:
//!
//! ```text
//! ERMHDR  ...            header, ignored
//! %T      TASK           start table TASK
//! %F      task_id  name  field list for the open table
//! %R      1        Foo   one record
//! %E                     end of table
//! ```
//!
//! Lines that are empty or start with `#` are skipped, and unknown lines are
//! ignored so newer exports still load. Only one line is held in memory at a
//! time besides the records collected so far. Invalid UTF-8 bytes are dropped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::ParseError;
use crate::models::{ColumnMapping, Record, TableRegistry};
use crate::sanitize::sanitize_field_list;

const TABLE_START: &str = "%T";
const FIELD_LIST: &str = "%F";
const RECORD: &str = "%R";
const TABLE_END: &str = "%E";
const COMMENT: char = '#';
const DELIMITER: char = '\t';

/// Parse the XER file at `path`.
pub fn parse_file(path: &Path) -> Result<TableRegistry, ParseError> {
    info!(path = %path.display(), "parsing XER file");

    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ParseError::NotFound(path.to_path_buf()),
        _ => ParseError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let registry = parse_reader(BufReader::new(file))?;

    info!(
        path = %path.display(),
        tables = registry.len(),
        records = registry.total_records(),
        "parsed XER file"
    );
    Ok(registry)
}

/// Parse XER content from any buffered reader.
pub fn parse_reader<R: BufRead>(mut reader: R) -> Result<TableRegistry, ParseError> {
    let mut registry = TableRegistry::new();
    let mut current: Option<usize> = None;
    let mut buf = Vec::new();
    let mut line_num = 0usize;

    loop {
        buf.clear();
        line_num += 1;
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| ParseError::Read {
                line: line_num,
                source,
            })?;
        if n == 0 {
            break;
        }

        let decoded = decode_lossy(&buf);
        let line = decoded.trim_start_matches('\u{feff}').trim();

        if line.is_empty() || line.starts_with(COMMENT) {
            continue;
        }

        if line.starts_with(TABLE_START) {
            if let Some(slot) = current.take() {
                log_completed(&registry, slot);
            }
            let name = line[TABLE_START.len()..].trim();
            if name.is_empty() {
                warn!(line = line_num, "table marker without a name, ignoring");
                continue;
            }
            current = Some(registry.open(name));
            info!(table = name, "found table");
            continue;
        }

        if line.starts_with(FIELD_LIST) {
            let Some(slot) = current else { continue };
            let raw: Vec<&str> = fields(line, FIELD_LIST).collect();
            let columns = sanitize_field_list(&raw);
            let block = registry.slot_mut(slot);

            // A repeated field list keeps earlier columns so earlier records
            // still fit the block.
            for column in &columns {
                if !block.columns.contains(column) {
                    block.columns.push(column.clone());
                }
            }
            block.mapping = ColumnMapping::new(&columns);

            debug!(
                table = %block.name,
                count = columns.len(),
                columns = ?columns.iter().take(10).collect::<Vec<_>>(),
                "columns discovered"
            );
            continue;
        }

        if line.starts_with(RECORD) {
            let Some(slot) = current else { continue };
            let block = registry.slot_mut(slot);
            if block.mapping.is_empty() {
                continue;
            }
            let values: Vec<&str> = fields(line, RECORD).collect();
            let record = Record {
                fields: block
                    .mapping
                    .iter()
                    .map(|(column, pos)| (column.to_string(), normalize(values.get(pos))))
                    .collect(),
            };
            block.records.push(record);
            continue;
        }

        if line.starts_with(TABLE_END) {
            if let Some(slot) = current.take() {
                log_completed(&registry, slot);
            }
            continue;
        }
    }

    if let Some(slot) = current {
        log_completed(&registry, slot);
    }

    Ok(registry)
}

/// Fields after `marker`. The tab right after the marker is a separator.
fn fields<'a>(line: &'a str, marker: &str) -> impl Iterator<Item = &'a str> {
    let rest = &line[marker.len()..];
    rest.strip_prefix(DELIMITER).unwrap_or(rest).split(DELIMITER)
}

fn normalize(value: Option<&&str>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn log_completed(registry: &TableRegistry, slot: usize) {
    if let Some(block) = registry.iter().nth(slot) {
        info!(table = %block.name, records = block.records.len(), "completed table");
    }
}

/// Decode UTF-8, dropping invalid byte sequences.
fn decode_lossy(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(s) => {
                out.push_str(s);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = e.error_len().unwrap_or(after.len());
                rest = &after[skip..];
            }
        }
    }
    out
}
