//! Core types shared across the conversion pipeline.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Supported input file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "xml")]
    Xml,
    #[serde(rename = "txt")]
    Txt,
}

// Custom error for parsing FileType from string
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unsupported file type: {0}")]
pub struct ParseFileTypeError(String);

impl FromStr for FileType {
    type Err = ParseFileTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "csv" => Ok(FileType::Csv),
            "xml" => Ok(FileType::Xml),
            "txt" => Ok(FileType::Txt),
            _ => Err(ParseFileTypeError(s.to_string())),
        }
    }
}

impl FileType {
    /// The file extension matched when scanning a directory.
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Csv => "csv",
            FileType::Xml => "xml",
            FileType::Txt => "txt",
        }
    }

    /// The subdirectory name used by the input/output layout.
    pub fn subdir(&self) -> &'static str {
        match self {
            FileType::Csv => "csv_files",
            FileType::Xml => "xml_files",
            FileType::Txt => "text_files",
        }
    }

    /// Determine the file type from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        ext.parse().ok()
    }
}

/// Errors that can abort converting a single file.
///
/// A missing field in a document is deliberately not represented here: it
/// produces a null value in the record and, at most, an entry in the
/// batch's missing-fields report.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The source file or directory does not exist.
    #[error("Input not found: {0:?}")]
    InputNotFound(PathBuf),

    /// The caller-supplied extraction spec or converter configuration is
    /// unusable. Aborts the whole batch, not just one file.
    #[error("Malformed extraction spec: {0}")]
    MalformedSpec(String),

    /// The file content could not be parsed.
    #[error("Failed to parse {path:?}: {reason}")]
    ParseFailure { path: PathBuf, reason: String },

    /// The destination could not be written.
    #[error("Failed to write {path:?}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub fn parse_failure(path: &Path, reason: impl ToString) -> Self {
        ConvertError::ParseFailure {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn write_failure(path: &Path, source: std::io::Error) -> Self {
        ConvertError::WriteFailure {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type ConvertResult<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_from_str() {
        assert_eq!("csv".parse(), Ok(FileType::Csv));
        assert_eq!("xml".parse(), Ok(FileType::Xml));
        assert_eq!("txt".parse(), Ok(FileType::Txt));
        assert!("pdf".parse::<FileType>().is_err());
    }

    #[test]
    fn test_file_type_from_path() {
        assert_eq!(FileType::from_path(Path::new("a/b/data.XML")), Some(FileType::Xml));
        assert_eq!(FileType::from_path(Path::new("notes.txt")), Some(FileType::Txt));
        assert_eq!(FileType::from_path(Path::new("archive.zip")), None);
        assert_eq!(FileType::from_path(Path::new("no_extension")), None);
    }
}
