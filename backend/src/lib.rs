pub mod types;
pub mod logger;
pub mod layout;
pub mod xml_tree;
pub mod location_path;
pub mod field_extract;
pub mod dedup;
pub mod record_writer;
pub mod xml_convert;
pub mod tabular_convert;
pub mod xslt_convert;
pub mod batch;
pub mod report;
