//! Per-file XML conversion.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::dedup::{record_identity, DuplicateGate};
use crate::field_extract::{extract, ExtractSpec};
use crate::types::{ConvertError, ConvertResult};
use crate::xml_tree::{parse_document, strip_stylesheet_pi};

/// Options for converting one XML file.
#[derive(Debug, Clone, Default)]
pub struct XmlOptions {
    pub spec: ExtractSpec,
    /// Record key whose value identifies the record for duplicate
    /// suppression. None disables the gate for this conversion.
    pub unique_field: Option<String>,
}

/// Convert one XML file to a record.
///
/// `Ok(None)` means the record was suppressed as a duplicate; the file
/// itself was fine.
pub fn convert_xml_file(
    path: &Path,
    options: &XmlOptions,
    gate: &mut DuplicateGate,
) -> ConvertResult<Option<Map<String, Value>>> {
    if !path.exists() {
        return Err(ConvertError::InputNotFound(path.to_path_buf()));
    }

    let content =
        fs::read_to_string(path).map_err(|e| ConvertError::parse_failure(path, e))?;
    let content = strip_stylesheet_pi(&content);

    let root = parse_document(&content).map_err(|e| ConvertError::parse_failure(path, e))?;

    let record = extract(&root, &options.spec)?;

    let identity = record_identity(&record, options.unique_field.as_deref());
    if !gate.check(identity.as_deref()) {
        tracing::debug!("Duplicate record suppressed: {:?}", path);
        return Ok(None);
    }

    Ok(Some(record))
}
