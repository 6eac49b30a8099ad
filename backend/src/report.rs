//! Batch log formatting.
//!
//! The conversion core only returns `BatchStats`; these helpers render
//! the log files an ingestion run leaves behind. Callers decide where
//! they land.

use std::fs::{create_dir_all, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::batch::BatchStats;

/// Write the batch summary: converted count and, per file, the fields
/// that came out null or empty.
pub fn write_summary_log(path: &Path, stats: &BatchStats) -> std::io::Result<()> {
    let mut out = String::new();
    out.push_str("-------------------------------------------------------------------------\n");
    out.push_str(&format!("Total JSON files converted: {}\n", stats.converted));
    out.push_str("-------------------------------------------------------------------------\n\n");

    out.push_str("Files with missing fields:\n");
    for entry in &stats.missing_fields {
        out.push_str(&format!("File: {}\n", entry.file));
        out.push_str("Missing fields:\n");
        for field in &entry.fields {
            out.push_str(&format!("  - {}\n", field));
        }
        out.push('\n');
    }

    ensure_parent(path)?;
    std::fs::write(path, out)
}

/// Write the list of files the batch could not convert.
pub fn write_unconverted_log(path: &Path, stats: &BatchStats) -> std::io::Result<()> {
    let mut out = String::new();
    out.push_str("-------------------------------------------------------------------------\n");
    out.push_str("Unconverted files:\n");
    for file in &stats.unconverted {
        out.push_str(&format!("  - {}\n", file));
    }

    ensure_parent(path)?;
    std::fs::write(path, out)
}

/// Append one timestamped line to the running activity log.
pub fn append_activity(path: &Path, message: &str) -> std::io::Result<()> {
    ensure_parent(path)?;
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "[{}] {}", timestamp, message)
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::MissingFieldsReport;

    #[test]
    fn test_summary_log_format() {
        let stats = BatchStats {
            converted: 2,
            skipped_duplicates: 0,
            unconverted: vec![],
            missing_fields: vec![MissingFieldsReport {
                file: "label_a.xml".to_string(),
                fields: vec!["title".to_string(), "manufacturer.name".to_string()],
            }],
        };

        let dir = std::env::temp_dir().join(format!("jsonify_report_{}", std::process::id()));
        let path = dir.join("log.txt");
        write_summary_log(&path, &stats).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Total JSON files converted: 2"));
        assert!(text.contains("File: label_a.xml"));
        assert!(text.contains("  - manufacturer.name"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
