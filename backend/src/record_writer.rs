//! JSON record serialization.
//!
//! One file per record, 4-space indentation, non-ASCII characters left
//! as-is, key order preserved as inserted.

use std::fs::{create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;

use crate::types::{ConvertError, ConvertResult};

pub fn to_pretty_json(value: &Value) -> String {
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, formatter);
    if value.serialize(&mut ser).is_err() {
        // Serializing a Value into a Vec cannot fail; keep the writer
        // total with the compact form anyway.
        return value.to_string();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Write one record as `<dir>/<base_name>.json`, creating `dir` as
/// needed. Returns the written path.
pub fn write_record(value: &Value, dir: &Path, base_name: &str) -> ConvertResult<PathBuf> {
    let path = dir.join(format!("{}.json", base_name));
    create_dir_all(dir).map_err(|e| ConvertError::write_failure(&path, e))?;
    let mut file = File::create(&path).map_err(|e| ConvertError::write_failure(&path, e))?;
    file.write_all(to_pretty_json(value).as_bytes())
        .map_err(|e| ConvertError::write_failure(&path, e))?;
    Ok(path)
}

/// Writes numbered per-row records: `record_1.json`, `record_2.json`, …
/// The counter advances only on a successful write, so accepted records
/// number densely with no gaps.
#[derive(Debug)]
pub struct RecordWriter {
    dir: PathBuf,
    count: usize,
}

impl RecordWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        RecordWriter { dir: dir.into(), count: 0 }
    }

    pub fn write_next(&mut self, value: &Value) -> ConvertResult<PathBuf> {
        let path = write_record(value, &self.dir, &format!("record_{}", self.count + 1))?;
        self.count += 1;
        Ok(path)
    }

    /// How many records have been written so far.
    pub fn count(&self) -> usize {
        self.count
    }
}
