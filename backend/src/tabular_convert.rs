//! Delimited text (CSV/TXT) conversion.
//!
//! Reads one delimited file into row records and writes one numbered
//! JSON file per accepted row. Cells are typed as integer, float, or
//! string; empty cells become null. Rows that are empty across all
//! columns and columns that are empty across all rows are dropped before
//! any record is emitted.

use std::fs;
use std::path::Path;

use serde_json::{Map, Number, Value};

use crate::dedup::{record_identity, DuplicateGate};
use crate::record_writer::RecordWriter;
use crate::types::{ConvertError, ConvertResult};

#[derive(Debug, Clone)]
pub struct TabularOptions {
    pub delimiter: u8,
    /// Physical lines skipped before the header row.
    pub skip_rows: usize,
    /// Columns to keep, in this order. None keeps every column.
    pub fields: Option<Vec<String>>,
    /// Column whose value identifies a row for duplicate suppression.
    pub unique_field: Option<String>,
}

impl Default for TabularOptions {
    fn default() -> Self {
        TabularOptions {
            delimiter: b',',
            skip_rows: 0,
            fields: None,
            unique_field: None,
        }
    }
}

impl TabularOptions {
    /// The conventional options for `~`-delimited text exports.
    pub fn for_txt() -> Self {
        TabularOptions { delimiter: b'~', ..Default::default() }
    }
}

/// Convert one delimited file; each accepted row becomes
/// `record_<N>.json` under `output_dir`. Returns the number of files
/// written.
pub fn convert_delimited_file(
    path: &Path,
    output_dir: &Path,
    options: &TabularOptions,
    gate: &mut DuplicateGate,
) -> ConvertResult<usize> {
    if !path.exists() {
        return Err(ConvertError::InputNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|e| ConvertError::parse_failure(path, e))?;
    let content: String = content
        .lines()
        .skip(options.skip_rows)
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ConvertError::parse_failure(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| ConvertError::parse_failure(path, e))?;
        let row: Vec<Value> = (0..headers.len())
            .map(|i| cell_value(record.get(i).unwrap_or("")))
            .collect();
        rows.push(row);
    }

    let (headers, rows) = match &options.fields {
        Some(fields) => project_columns(headers, rows, fields)?,
        None => (headers, rows),
    };
    let (headers, rows) = prune_empty(headers, rows);

    let mut writer = RecordWriter::new(output_dir);
    for row in rows {
        let mut record = Map::new();
        for (header, value) in headers.iter().zip(row) {
            record.insert(header.clone(), value);
        }

        let identity = record_identity(&record, options.unique_field.as_deref());
        if !gate.check(identity.as_deref()) {
            tracing::debug!("Duplicate row suppressed in {:?}", path);
            continue;
        }

        writer.write_next(&Value::Object(record))?;
    }

    tracing::info!("Converted {:?}: {} record files", path, writer.count());
    Ok(writer.count())
}

fn cell_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

fn project_columns(
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
    fields: &[String],
) -> ConvertResult<(Vec<String>, Vec<Vec<Value>>)> {
    let mut indices = Vec::with_capacity(fields.len());
    for field in fields {
        let idx = headers.iter().position(|h| h == field).ok_or_else(|| {
            ConvertError::MalformedSpec(format!("unknown column '{}'", field))
        })?;
        indices.push(idx);
    }
    let rows = rows
        .into_iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok((fields.to_vec(), rows))
}

/// Drop columns that are null in every row, then rows that are null in
/// every remaining column.
fn prune_empty(headers: Vec<String>, rows: Vec<Vec<Value>>) -> (Vec<String>, Vec<Vec<Value>>) {
    if rows.is_empty() {
        return (headers, rows);
    }

    let keep: Vec<bool> = (0..headers.len())
        .map(|i| rows.iter().any(|row| !row[i].is_null()))
        .collect();

    let headers: Vec<String> = headers
        .into_iter()
        .zip(&keep)
        .filter(|(_, keep)| **keep)
        .map(|(h, _)| h)
        .collect();
    let rows: Vec<Vec<Value>> = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&keep)
                .filter(|(_, keep)| **keep)
                .map(|(v, _)| v)
                .collect::<Vec<Value>>()
        })
        .filter(|row: &Vec<Value>| row.iter().any(|v| !v.is_null()))
        .collect();

    (headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cell_value_typing() {
        assert_eq!(cell_value(""), Value::Null);
        assert_eq!(cell_value("42"), json!(42));
        assert_eq!(cell_value("-3"), json!(-3));
        assert_eq!(cell_value("2.5"), json!(2.5));
        assert_eq!(cell_value("20240315x"), json!("20240315x"));
        assert_eq!(cell_value(" 42"), json!(" 42"));
    }

    #[test]
    fn test_prune_empty_rows_and_columns() {
        let headers = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let rows = vec![
            vec![json!(1), Value::Null, json!("x")],
            vec![Value::Null, Value::Null, Value::Null],
            vec![json!(2), Value::Null, json!("y")],
        ];
        let (headers, rows) = prune_empty(headers, rows);
        assert_eq!(headers, vec!["a", "c"]);
        assert_eq!(rows, vec![vec![json!(1), json!("x")], vec![json!(2), json!("y")]]);
    }

    #[test]
    fn test_project_columns_unknown_is_malformed() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let rows = vec![vec![json!(1), json!(2)]];
        let result = project_columns(headers, rows, &["ghost".to_string()]);
        assert!(matches!(result, Err(ConvertError::MalformedSpec(_))));
    }
}
