use std::path::{Path, PathBuf};
use std::process::exit;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use serde_json::Value;

use jsonify_backend::batch::{self, BatchStats};
use jsonify_backend::dedup::DuplicateGate;
use jsonify_backend::field_extract::ExtractSpec;
use jsonify_backend::layout::DirectoryLayout;
use jsonify_backend::logger;
use jsonify_backend::record_writer::write_record;
use jsonify_backend::report;
use jsonify_backend::tabular_convert::{convert_delimited_file, TabularOptions};
use jsonify_backend::types::FileType;
use jsonify_backend::xml_convert::{convert_xml_file, XmlOptions};
use jsonify_backend::xslt_convert::{convert_with_template, validate_template, CommandXslt, XsltOptions};

#[derive(Parser, Debug)]
#[command(author, version, about = "Jsonify CLI", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Optional base directory for the input/output layout.
    /// If not provided, the JSONIFY_DIR environment variable will be used.
    #[arg(long, global = true, value_name = "DIRECTORY_PATH", env = "JSONIFY_DIR")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert an XML file, or a directory of XML files, to JSON records
    #[command(arg_required_else_help = true)]
    ConvertXml {
        /// XML file or directory
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Output directory (defaults to the layout's xml output dir,
        /// or the input's own directory)
        #[arg(long, value_name = "DIRECTORY_PATH")]
        output: Option<PathBuf>,

        /// JSON extraction spec (fields / field_map / extra_fields /
        /// groups / namespaces / root_tag)
        #[arg(long, value_name = "FILE_PATH")]
        spec: Option<PathBuf>,

        /// Conversion engine
        #[arg(long, value_enum, default_value_t = XmlEngine::Paths)]
        converter: XmlEngine,

        /// Stylesheet template for the xslt engine
        #[arg(long, value_name = "FILE_PATH")]
        xslt: Option<PathBuf>,

        /// Record key used for duplicate suppression
        #[arg(long, value_name = "KEY")]
        unique_field: Option<String>,

        /// Newline-delimited log of previously accepted identities
        #[arg(long, value_name = "FILE_PATH")]
        processed_log: Option<PathBuf>,
    },

    /// Convert a delimited CSV file to one JSON record per row
    #[command(arg_required_else_help = true)]
    ConvertCsv {
        #[arg(value_name = "FILE_PATH")]
        path: PathBuf,

        #[arg(long, value_name = "DIRECTORY_PATH")]
        output: Option<PathBuf>,

        /// Field delimiter (single byte)
        #[arg(long, default_value = ",")]
        delimiter: String,

        /// Lines to skip before the header row
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,

        /// Comma-separated list of columns to keep
        #[arg(long, value_delimiter = ',', value_name = "COLUMNS")]
        fields: Option<Vec<String>>,

        #[arg(long, value_name = "KEY")]
        unique_field: Option<String>,

        #[arg(long, value_name = "FILE_PATH")]
        processed_log: Option<PathBuf>,
    },

    /// Convert a delimited TXT file (default `~` delimiter) to one JSON
    /// record per row
    #[command(arg_required_else_help = true)]
    ConvertTxt {
        #[arg(value_name = "FILE_PATH")]
        path: PathBuf,

        #[arg(long, value_name = "DIRECTORY_PATH")]
        output: Option<PathBuf>,

        #[arg(long, default_value = "~")]
        delimiter: String,

        #[arg(long, default_value_t = 0)]
        skip_rows: usize,

        #[arg(long, value_delimiter = ',', value_name = "COLUMNS")]
        fields: Option<Vec<String>>,

        #[arg(long, value_name = "KEY")]
        unique_field: Option<String>,

        #[arg(long, value_name = "FILE_PATH")]
        processed_log: Option<PathBuf>,
    },

    /// Process the base directory's input tree and write records,
    /// dedup logs and batch reports under its output tree
    Batch {
        /// File types to process
        #[arg(long, value_delimiter = ',', default_values_t = vec![TypeArg::Csv, TypeArg::Xml, TypeArg::Txt])]
        types: Vec<TypeArg>,

        /// JSON extraction spec for the xml type
        #[arg(long, value_name = "FILE_PATH")]
        spec: Option<PathBuf>,

        /// Conversion engine for the xml type
        #[arg(long, value_enum, default_value_t = XmlEngine::Paths)]
        converter: XmlEngine,

        /// Stylesheet template for the xslt engine
        #[arg(long, value_name = "FILE_PATH")]
        xslt: Option<PathBuf>,

        /// Record key used for duplicate suppression
        #[arg(long, value_name = "KEY")]
        unique_field: Option<String>,
    },
}

/// Enum for the XML conversion engines available.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum XmlEngine {
    /// Location-path extraction driven by a spec file
    Paths,
    /// External stylesheet transformation
    Xslt,
}

impl std::fmt::Display for XmlEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            XmlEngine::Paths => "paths",
            XmlEngine::Xslt => "xslt",
        };
        write!(f, "{}", s)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TypeArg {
    Csv,
    Xml,
    Txt,
}

impl std::fmt::Display for TypeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TypeArg::Csv => "csv",
            TypeArg::Xml => "xml",
            TypeArg::Txt => "txt",
        };
        write!(f, "{}", s)
    }
}

impl From<TypeArg> for FileType {
    fn from(value: TypeArg) -> Self {
        match value {
            TypeArg::Csv => FileType::Csv,
            TypeArg::Xml => FileType::Xml,
            TypeArg::Txt => FileType::Txt,
        }
    }
}

fn main() {
    // Attempt to load .env file. This might define JSONIFY_DIR if it's
    // not already in the environment. Clap will pick it up via
    // `env = "JSONIFY_DIR"`.
    if dotenv().is_err() {
        println!("Info: No .env file found or failed to load.");
    }

    if let Err(e) = logger::init_tracing() {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    let cli = Cli::parse();
    let base_dir = cli.base_dir.clone();

    let command_result = match cli.command {
        Commands::ConvertXml {
            path,
            output,
            spec,
            converter,
            xslt,
            unique_field,
            processed_log,
        } => convert_xml_command(
            &base_dir,
            path,
            output,
            spec,
            converter,
            xslt,
            unique_field,
            processed_log,
        ),

        Commands::ConvertCsv {
            path,
            output,
            delimiter,
            skip_rows,
            fields,
            unique_field,
            processed_log,
        } => convert_tabular_command(
            &base_dir,
            FileType::Csv,
            path,
            output,
            delimiter,
            skip_rows,
            fields,
            unique_field,
            processed_log,
        ),

        Commands::ConvertTxt {
            path,
            output,
            delimiter,
            skip_rows,
            fields,
            unique_field,
            processed_log,
        } => convert_tabular_command(
            &base_dir,
            FileType::Txt,
            path,
            output,
            delimiter,
            skip_rows,
            fields,
            unique_field,
            processed_log,
        ),

        Commands::Batch { types, spec, converter, xslt, unique_field } => {
            run_batch(&base_dir, types, spec, converter, xslt, unique_field)
        }
    };

    if let Err(e) = command_result {
        eprintln!("Error executing command: {:#}", e);
        exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
fn convert_xml_command(
    base_dir: &Option<PathBuf>,
    path: PathBuf,
    output: Option<PathBuf>,
    spec: Option<PathBuf>,
    converter: XmlEngine,
    xslt: Option<PathBuf>,
    unique_field: Option<String>,
    processed_log: Option<PathBuf>,
) -> Result<()> {
    let output_dir = resolve_output_dir(output, base_dir, FileType::Xml, &path);

    match converter {
        XmlEngine::Paths => {
            let spec_path = match spec {
                Some(p) => p,
                None => bail!("the paths converter requires --spec"),
            };
            let options = XmlOptions { spec: load_spec(&spec_path)?, unique_field };

            if path.is_dir() {
                let stats = batch::process_xml_directory(
                    &path,
                    &output_dir,
                    &options,
                    processed_log.as_deref(),
                )?;
                print_stats(&stats);
                return Ok(());
            }

            let mut gate = DuplicateGate::load(processed_log.as_deref())
                .with_context(|| format!("Failed to load processed log: {:?}", processed_log))?;
            match convert_xml_file(&path, &options, &mut gate)? {
                Some(record) => {
                    let written =
                        write_record(&Value::Object(record), &output_dir, &file_stem(&path))?;
                    println!("Converted: {:?} -> {:?}", path, written);
                }
                None => println!("Skipped duplicate: {:?}", path),
            }
            if let Some(log) = &processed_log {
                gate.commit(log)?;
            }
            Ok(())
        }

        XmlEngine::Xslt => {
            let options = XsltOptions { template: xslt, unique_field };
            let engine = CommandXslt::default();

            if path.is_dir() {
                let stats = batch::process_xml_directory_with_xslt(
                    &path,
                    &output_dir,
                    &options,
                    &engine,
                    processed_log.as_deref(),
                )?;
                print_stats(&stats);
                return Ok(());
            }

            let template = validate_template(options.template.as_deref())?;
            let mut gate = DuplicateGate::load(processed_log.as_deref())
                .with_context(|| format!("Failed to load processed log: {:?}", processed_log))?;
            match convert_with_template(
                &path,
                template,
                &engine,
                options.unique_field.as_deref(),
                &mut gate,
            )? {
                Some(value) => {
                    let written = write_record(&value, &output_dir, &file_stem(&path))?;
                    println!("Converted: {:?} -> {:?}", path, written);
                }
                None => println!("Skipped duplicate: {:?}", path),
            }
            if let Some(log) = &processed_log {
                gate.commit(log)?;
            }
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn convert_tabular_command(
    base_dir: &Option<PathBuf>,
    file_type: FileType,
    path: PathBuf,
    output: Option<PathBuf>,
    delimiter: String,
    skip_rows: usize,
    fields: Option<Vec<String>>,
    unique_field: Option<String>,
    processed_log: Option<PathBuf>,
) -> Result<()> {
    let output_dir = resolve_output_dir(output, base_dir, file_type, &path);
    let options = TabularOptions {
        delimiter: delimiter_byte(&delimiter)?,
        skip_rows,
        fields,
        unique_field,
    };

    let mut gate = DuplicateGate::load(processed_log.as_deref())
        .with_context(|| format!("Failed to load processed log: {:?}", processed_log))?;
    let written = convert_delimited_file(&path, &output_dir, &options, &mut gate)?;
    if let Some(log) = &processed_log {
        gate.commit(log)?;
    }

    println!("Conversion completed: {} files created in {:?}", written, output_dir);
    Ok(())
}

fn run_batch(
    base_dir: &Option<PathBuf>,
    types: Vec<TypeArg>,
    spec: Option<PathBuf>,
    converter: XmlEngine,
    xslt: Option<PathBuf>,
    unique_field: Option<String>,
) -> Result<()> {
    let base = match base_dir {
        Some(p) => p.clone(),
        None => bail!("batch needs --base-dir or the JSONIFY_DIR environment variable"),
    };

    let layout = DirectoryLayout::new(&base);
    layout
        .ensure()
        .with_context(|| format!("Failed to create the directory layout under {:?}", base))?;
    let logs_dir = layout.logs_dir();

    for type_arg in types {
        let file_type: FileType = type_arg.into();
        let input_dir = layout.input_dir_for(file_type);
        let output_dir = layout.output_dir_for(file_type);
        let ext = file_type.extension();
        let processed_log = logs_dir.join(format!("processed_{}.log", ext));

        let stats = match file_type {
            FileType::Xml => match converter {
                XmlEngine::Paths => {
                    let spec_path = match &spec {
                        Some(p) => p.clone(),
                        None => bail!("the paths converter requires --spec for the xml type"),
                    };
                    let options = XmlOptions {
                        spec: load_spec(&spec_path)?,
                        unique_field: unique_field.clone(),
                    };
                    batch::process_xml_directory(
                        &input_dir,
                        &output_dir,
                        &options,
                        Some(&processed_log),
                    )?
                }
                XmlEngine::Xslt => {
                    let options = XsltOptions {
                        template: xslt.clone(),
                        unique_field: unique_field.clone(),
                    };
                    batch::process_xml_directory_with_xslt(
                        &input_dir,
                        &output_dir,
                        &options,
                        &CommandXslt::default(),
                        Some(&processed_log),
                    )?
                }
            },
            FileType::Csv => {
                let options = TabularOptions {
                    unique_field: unique_field.clone(),
                    ..Default::default()
                };
                batch::process_tabular_directory(
                    &input_dir,
                    &output_dir,
                    file_type,
                    &options,
                    Some(&processed_log),
                )?
            }
            FileType::Txt => {
                let options = TabularOptions {
                    unique_field: unique_field.clone(),
                    ..TabularOptions::for_txt()
                };
                batch::process_tabular_directory(
                    &input_dir,
                    &output_dir,
                    file_type,
                    &options,
                    Some(&processed_log),
                )?
            }
        };

        let summary_log = logs_dir.join(format!("{}_conversion_log.txt", ext));
        let unconverted_log = logs_dir.join(format!("{}_unconverted.txt", ext));
        report::write_summary_log(&summary_log, &stats)
            .with_context(|| format!("Failed to write {:?}", summary_log))?;
        report::write_unconverted_log(&unconverted_log, &stats)
            .with_context(|| format!("Failed to write {:?}", unconverted_log))?;
        report::append_activity(
            &logs_dir.join("activity.log"),
            &format!(
                "{}: {} converted, {} duplicates skipped, {} unconverted",
                ext,
                stats.converted,
                stats.skipped_duplicates,
                stats.unconverted.len()
            ),
        )?;

        println!("=== {} ===", ext);
        print_stats(&stats);
        println!("Missing fields in {:?}", summary_log);
        println!("Unconverted files in {:?}", unconverted_log);
    }

    Ok(())
}

fn load_spec(path: &Path) -> Result<ExtractSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read spec file: {:?}", path))?;
    let spec: ExtractSpec = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse spec file: {:?}", path))?;
    Ok(spec)
}

fn delimiter_byte(s: &str) -> Result<u8> {
    match s.as_bytes() {
        [b] => Ok(*b),
        _ => bail!("delimiter must be a single byte, got '{}'", s),
    }
}

/// Precedence: --output, then the base layout's output dir for the
/// type, then the input's own directory.
fn resolve_output_dir(
    output: Option<PathBuf>,
    base_dir: &Option<PathBuf>,
    file_type: FileType,
    input: &Path,
) -> PathBuf {
    if let Some(out) = output {
        return out;
    }
    if let Some(base) = base_dir {
        return DirectoryLayout::new(base).output_dir_for(file_type);
    }
    if input.is_dir() {
        return input.to_path_buf();
    }
    input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("record")
        .to_string()
}

fn print_stats(stats: &BatchStats) {
    println!("Total of JSON files converted: {}", stats.converted);
    println!("Total of duplicates skipped: {}", stats.skipped_duplicates);
    println!("Total of unconverted files: {}", stats.unconverted.len());
}
