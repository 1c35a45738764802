//! Minimal reader for the small comma-separated tables the jobs keep on disk.

use crate::core::error::TaskError;
use indexmap::IndexMap;
use std::path::Path;

pub type Row = IndexMap<String, String>;

/// Read a headed CSV file. Fields may be double-quoted; `""` inside quotes is a literal quote.
///
/// Records are split on line breaks before quotes are read, so a quoted field
/// cannot span lines; such a file fails with TABLE-002.
pub fn read_table(path: &Path) -> Result<Vec<Row>, TaskError> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        TaskError::from(err)
            .with_code("TABLE-001")
            .with_context("path", path.display().to_string())
    })?;
    parse_table(&content).map_err(|err| err.with_context("path", path.display().to_string()))
}

pub fn parse_table(content: &str) -> Result<Vec<Row>, TaskError> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());
    let header = match lines.next() {
        Some((_, line)) => split_record(line)?,
        None => return Ok(Vec::new()),
    };
    let header: Vec<String> = header.into_iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for (number, line) in lines {
        let fields = split_record(line)?;
        if fields.len() != header.len() {
            return Err(TaskError::new(format!(
                "line {} has {} fields, expected {}",
                number + 1,
                fields.len(),
                header.len()
            ))
            .with_code("TABLE-002"));
        }
        rows.push(header.iter().cloned().zip(fields).collect());
    }
    Ok(rows)
}

fn split_record(line: &str) -> Result<Vec<String>, TaskError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if field.trim().is_empty() => {
                field.clear();
                quoted = true;
            }
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    if quoted {
        return Err(TaskError::new(format!("unterminated quote in '{}'", line)).with_code("TABLE-002"));
    }
    fields.push(field);
    Ok(fields)
}
