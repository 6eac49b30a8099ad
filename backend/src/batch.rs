//! Directory-level orchestration.
//!
//! One batch walks one directory, processes each file to completion, and
//! aggregates counts. Per-file failures are recorded and logged; only
//! configuration mistakes abort the batch.

use std::path::{Path, PathBuf};

use serde_json::Value;
use walkdir::WalkDir;

use crate::dedup::DuplicateGate;
use crate::record_writer::write_record;
use crate::tabular_convert::{convert_delimited_file, TabularOptions};
use crate::types::{ConvertError, ConvertResult, FileType};
use crate::xml_convert::{convert_xml_file, XmlOptions};
use crate::xslt_convert::{convert_with_template, validate_template, XsltOptions, XsltTransform};

/// Statistics from one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    /// Number of records (or record sets, for tabular files) written.
    pub converted: usize,
    /// Number of records suppressed by the duplicate gate.
    pub skipped_duplicates: usize,
    /// Files that could not be converted.
    pub unconverted: Vec<String>,
    /// Per-file reports of null or empty fields in the written records.
    pub missing_fields: Vec<MissingFieldsReport>,
}

#[derive(Debug, Clone)]
pub struct MissingFieldsReport {
    pub file: String,
    pub fields: Vec<String>,
}

/// Convert every XML file in `input_dir` using location-path extraction.
pub fn process_xml_directory(
    input_dir: &Path,
    output_dir: &Path,
    options: &XmlOptions,
    processed_log: Option<&Path>,
) -> ConvertResult<BatchStats> {
    options.spec.validate()?;

    let files = list_files(input_dir, FileType::Xml.extension())?;
    let mut gate = load_gate(processed_log)?;
    let mut stats = BatchStats::default();

    for file in &files {
        match convert_xml_file(file, options, &mut gate) {
            Ok(Some(record)) => {
                finish_record(&Value::Object(record), output_dir, file, &mut stats);
            }
            Ok(None) => stats.skipped_duplicates += 1,
            Err(e @ ConvertError::MalformedSpec(_)) => return Err(e),
            Err(e) => {
                tracing::warn!("Could not convert {:?}: {}", file, e);
                stats.unconverted.push(file_name(file));
            }
        }
    }

    if let Some(path) = processed_log {
        gate.commit(path)?;
    }
    log_summary("xml", &stats);
    Ok(stats)
}

/// Convert every XML file in `input_dir` through an external stylesheet
/// engine. The template is validated before any file I/O.
pub fn process_xml_directory_with_xslt(
    input_dir: &Path,
    output_dir: &Path,
    options: &XsltOptions,
    engine: &dyn XsltTransform,
    processed_log: Option<&Path>,
) -> ConvertResult<BatchStats> {
    let template = validate_template(options.template.as_deref())?;

    let files = list_files(input_dir, FileType::Xml.extension())?;
    let mut gate = load_gate(processed_log)?;
    let mut stats = BatchStats::default();

    for file in &files {
        match convert_with_template(
            file,
            template,
            engine,
            options.unique_field.as_deref(),
            &mut gate,
        ) {
            Ok(Some(value)) => {
                finish_record(&value, output_dir, file, &mut stats);
            }
            Ok(None) => stats.skipped_duplicates += 1,
            Err(e @ ConvertError::MalformedSpec(_)) => return Err(e),
            Err(e) => {
                tracing::warn!("Could not convert {:?}: {}", file, e);
                stats.unconverted.push(file_name(file));
            }
        }
    }

    if let Some(path) = processed_log {
        gate.commit(path)?;
    }
    log_summary("xslt", &stats);
    Ok(stats)
}

/// Convert every delimited file in `input_dir`. Each file's rows become
/// numbered records under `output_dir/<file stem>/`.
pub fn process_tabular_directory(
    input_dir: &Path,
    output_dir: &Path,
    file_type: FileType,
    options: &TabularOptions,
    processed_log: Option<&Path>,
) -> ConvertResult<BatchStats> {
    let files = list_files(input_dir, file_type.extension())?;
    let mut gate = load_gate(processed_log)?;
    let mut stats = BatchStats::default();

    for file in &files {
        let file_output = output_dir.join(file_stem(file));
        match convert_delimited_file(file, &file_output, options, &mut gate) {
            Ok(written) => {
                stats.converted += written;
            }
            Err(e @ ConvertError::MalformedSpec(_)) => return Err(e),
            Err(e) => {
                tracing::warn!("Could not convert {:?}: {}", file, e);
                stats.unconverted.push(file_name(file));
            }
        }
    }

    if let Some(path) = processed_log {
        gate.commit(path)?;
    }
    log_summary(file_type.extension(), &stats);
    Ok(stats)
}

fn load_gate(processed_log: Option<&Path>) -> ConvertResult<DuplicateGate> {
    match processed_log {
        Some(path) => {
            DuplicateGate::load(Some(path)).map_err(|e| ConvertError::parse_failure(path, e))
        }
        None => Ok(DuplicateGate::default()),
    }
}

fn finish_record(value: &Value, output_dir: &Path, source: &Path, stats: &mut BatchStats) {
    match write_record(value, output_dir, &file_stem(source)) {
        Ok(path) => {
            stats.converted += 1;
            tracing::info!("Converted: {:?} -> {:?}", source, path);
            let fields = missing_fields(value);
            if !fields.is_empty() {
                stats.missing_fields.push(MissingFieldsReport {
                    file: file_name(source),
                    fields,
                });
            }
        }
        Err(e) => {
            tracing::warn!("Could not write record for {:?}: {}", source, e);
            stats.unconverted.push(file_name(source));
        }
    }
}

/// Dotted paths of null or empty-list fields in a record, with `[idx]`
/// for positions inside lists.
pub fn missing_fields(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    scan_missing(value, "", &mut found);
    found
}

fn scan_missing(value: &Value, parent: &str, found: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let full = if parent.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", parent, key)
                };
                let empty_list = matches!(val, Value::Array(items) if items.is_empty());
                if val.is_null() || empty_list {
                    found.push(full);
                } else {
                    scan_missing(val, &full, found);
                }
            }
        }
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                scan_missing(item, &format!("{}[{}]", parent, idx), found);
            }
        }
        _ => {}
    }
}

fn list_files(dir: &Path, extension: &str) -> ConvertResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ConvertError::InputNotFound(dir.to_path_buf()));
    }
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case(extension))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("<unnamed>")
        .to_string()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("record")
        .to_string()
}

fn log_summary(kind: &str, stats: &BatchStats) {
    tracing::info!(
        "Batch ({}) finished: {} converted, {} duplicates skipped, {} unconverted",
        kind,
        stats.converted,
        stats.skipped_duplicates,
        stats.unconverted.len()
    );
}
