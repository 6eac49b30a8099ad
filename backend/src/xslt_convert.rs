//! Stylesheet-based conversion seam.
//!
//! The transformation itself is an external engine. The pipeline only
//! validates the configuration, hands the engine a document and a
//! template, and treats whatever comes back exactly like its own
//! extraction result for dedup and writing.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

use crate::dedup::{record_identity, DuplicateGate};
use crate::types::{ConvertError, ConvertResult};

/// An external template-transformation engine. Implementations return
/// the transformed document as a JSON value, or an empty object on any
/// failure; they never raise.
pub trait XsltTransform {
    fn apply(&self, xml_path: &Path, xslt_path: &Path) -> Value;
}

/// Runs a stylesheet processor as a subprocess (`xsltproc` by default)
/// and parses its stdout as JSON.
#[derive(Debug, Clone)]
pub struct CommandXslt {
    program: String,
}

impl Default for CommandXslt {
    fn default() -> Self {
        CommandXslt { program: "xsltproc".to_string() }
    }
}

impl CommandXslt {
    pub fn new(program: impl Into<String>) -> Self {
        CommandXslt { program: program.into() }
    }
}

impl XsltTransform for CommandXslt {
    fn apply(&self, xml_path: &Path, xslt_path: &Path) -> Value {
        let output = match Command::new(&self.program)
            .arg(xslt_path)
            .arg(xml_path)
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("Failed to run {}: {}", self.program, e);
                return Value::Object(Default::default());
            }
        };
        if !output.status.success() {
            tracing::error!(
                "{} failed for {:?}: {}",
                self.program,
                xml_path,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Value::Object(Default::default());
        }
        match serde_json::from_slice(&output.stdout) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Transform output for {:?} is not JSON: {}", xml_path, e);
                Value::Object(Default::default())
            }
        }
    }
}

/// Options for the stylesheet conversion path.
#[derive(Debug, Clone, Default)]
pub struct XsltOptions {
    pub template: Option<PathBuf>,
    pub unique_field: Option<String>,
}

/// Check the stylesheet configuration. Called before any file I/O so a
/// missing template aborts the whole batch.
pub fn validate_template(template: Option<&Path>) -> ConvertResult<&Path> {
    template.ok_or_else(|| {
        ConvertError::MalformedSpec(
            "the xslt converter requires a stylesheet template path".to_string(),
        )
    })
}

/// Convert one XML file through the engine. `Ok(None)` means the result
/// was suppressed as a duplicate.
pub fn convert_with_template(
    path: &Path,
    template: &Path,
    engine: &dyn XsltTransform,
    unique_field: Option<&str>,
    gate: &mut DuplicateGate,
) -> ConvertResult<Option<Value>> {
    if !path.exists() {
        return Err(ConvertError::InputNotFound(path.to_path_buf()));
    }

    let value = engine.apply(path, template);

    let identity = match &value {
        Value::Object(map) => record_identity(map, unique_field),
        _ => None,
    };
    if !gate.check(identity.as_deref()) {
        tracing::debug!("Duplicate record suppressed: {:?}", path);
        return Ok(None);
    }

    Ok(Some(value))
}
