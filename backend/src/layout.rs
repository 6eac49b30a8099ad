//! Input/output directory layout.
//!
//! The layout is an explicit value constructed once by the caller and
//! passed into whatever needs it; there is no process-wide layout state.

use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use crate::types::FileType;

const ALL_TYPES: [FileType; 3] = [FileType::Csv, FileType::Xml, FileType::Txt];

/// Maps file types to their canonical input and output subdirectories
/// under one base directory:
///
/// ```text
/// <base>/input/{csv_files,xml_files,text_files}
/// <base>/output/{csv_files,xml_files,text_files}
/// <base>/output/logs
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryLayout {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl DirectoryLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        DirectoryLayout {
            input_dir: base_dir.join("input"),
            output_dir: base_dir.join("output"),
        }
    }

    /// Create the full directory tree. Idempotent.
    pub fn ensure(&self) -> std::io::Result<()> {
        for file_type in ALL_TYPES {
            create_dir_all(self.input_dir_for(file_type))?;
            create_dir_all(self.output_dir_for(file_type))?;
        }
        create_dir_all(self.logs_dir())?;
        Ok(())
    }

    pub fn input_dir_for(&self, file_type: FileType) -> PathBuf {
        self.input_dir.join(file_type.subdir())
    }

    pub fn output_dir_for(&self, file_type: FileType) -> PathBuf {
        self.output_dir.join(file_type.subdir())
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.output_dir.join("logs")
    }

    /// Default output path for an input file, derived from its extension
    /// and stem. None if the extension is not a supported type.
    pub fn default_output_path_for(&self, input_file: &Path) -> Option<PathBuf> {
        let file_type = FileType::from_path(input_file)?;
        let stem = input_file.file_stem()?.to_str()?;
        Some(self.output_dir_for(file_type).join(format!("{}.json", stem)))
    }
}
