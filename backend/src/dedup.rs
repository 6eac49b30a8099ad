//! Cross-run duplicate suppression.
//!
//! Previously accepted identities are persisted as newline-delimited
//! text. A batch loads the log once, tracks its own acceptances in
//! memory, and appends them to the log when the batch completes.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde_json::{Map, Value};

use crate::types::{ConvertError, ConvertResult};

/// Normalize an identity for comparison: surrounding whitespace and case
/// are insignificant.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The shapes an identity field takes in practice. A "product name" is
/// frequently not a plain string but an object, or a list of
/// ingredient-like objects, carrying a `name` key.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentityShape {
    Scalar(Value),
    Object(Map<String, Value>),
    ListOfObjects(Vec<Map<String, Value>>),
}

/// Classify a raw field value into its identity shape.
pub fn classify(value: &Value) -> IdentityShape {
    match value {
        Value::Array(items) if !items.is_empty() => {
            let objects: Vec<Map<String, Value>> = items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect();
            if objects.len() == items.len() {
                IdentityShape::ListOfObjects(objects)
            } else {
                IdentityShape::Scalar(value.clone())
            }
        }
        Value::Object(map) => IdentityShape::Object(map.clone()),
        other => IdentityShape::Scalar(other.clone()),
    }
}

/// The normalized identity string for a shape, if it has one. Total over
/// all shapes; `None` means there is nothing to compare, so the record
/// can never be a duplicate.
pub fn identity_of(shape: &IdentityShape) -> Option<String> {
    let name_of = |map: &Map<String, Value>| map.get("name").and_then(scalar_string);
    let raw = match shape {
        IdentityShape::ListOfObjects(items) => items.first().and_then(name_of),
        IdentityShape::Object(map) => name_of(map),
        IdentityShape::Scalar(value) => scalar_string(value),
    };
    raw.map(|s| normalize_identity(&s)).filter(|s| !s.is_empty())
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// The identity of a record under a caller-chosen uniqueness field.
pub fn record_identity(record: &Map<String, Value>, unique_field: Option<&str>) -> Option<String> {
    let field = unique_field?;
    let value = record.get(field)?;
    identity_of(&classify(value))
}

/// Decides, per record, whether to accept or skip it, across runs and
/// within the current batch.
#[derive(Debug, Default)]
pub struct DuplicateGate {
    seen: HashSet<String>,
    accepted: Vec<String>,
}

impl DuplicateGate {
    /// Load previously accepted identities. A missing log (or no log at
    /// all) is an empty set, not an error.
    pub fn load(path: Option<&Path>) -> std::io::Result<Self> {
        let mut seen = HashSet::new();
        if let Some(path) = path {
            if path.exists() {
                let reader = BufReader::new(File::open(path)?);
                for line in reader.lines() {
                    let id = normalize_identity(&line?);
                    if !id.is_empty() {
                        seen.insert(id);
                    }
                }
            }
        }
        Ok(DuplicateGate { seen, accepted: Vec::new() })
    }

    /// Whether a record with this identity passes the gate. `None` (and
    /// the empty string) always passes and is never recorded: there is
    /// nothing to compare. Accepted identities are visible to later
    /// checks in the same batch before any commit.
    pub fn check(&mut self, identity: Option<&str>) -> bool {
        let Some(raw) = identity else {
            return true;
        };
        let id = normalize_identity(raw);
        if id.is_empty() {
            return true;
        }
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.accepted.push(id);
        true
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    /// Append this batch's newly accepted identities to the log, one per
    /// line. The log is never truncated or rewritten.
    pub fn commit(&self, path: &Path) -> ConvertResult<()> {
        if self.accepted.is_empty() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConvertError::write_failure(path, e))?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ConvertError::write_failure(path, e))?;
        for id in &self.accepted {
            writeln!(file, "{}", id).map_err(|e| ConvertError::write_failure(path, e))?;
        }
        Ok(())
    }
}
