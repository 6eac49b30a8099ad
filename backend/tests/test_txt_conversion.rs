//! End-to-end tests for delimited-text conversion.

use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};

use jsonify_backend::dedup::DuplicateGate;
use jsonify_backend::tabular_convert::{convert_delimited_file, TabularOptions};
use jsonify_backend::types::ConvertError;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("jsonify_txt_{}_{}", name, std::process::id()));
    if dir.exists() {
        fs::remove_dir_all(&dir).unwrap();
    }
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn read_record(dir: &PathBuf, n: usize) -> Value {
    let text = fs::read_to_string(dir.join(format!("record_{}.json", n))).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_three_row_txt_produces_three_record_files() {
    let dir = temp_dir("three_rows");
    let input = dir.join("people.txt");
    fs::write(
        &input,
        "Name~Age~City~Occupation~Skills\n\
         Alice~30~Lisbon~Engineer~Rust\n\
         Bob~41~Porto~Baker~Sourdough\n\
         Carol~28~Faro~Pilot~Navigation\n",
    )
    .unwrap();

    let output = dir.join("out");
    let mut gate = DuplicateGate::default();
    let written =
        convert_delimited_file(&input, &output, &TabularOptions::for_txt(), &mut gate).unwrap();
    assert_eq!(written, 3);

    let first = read_record(&output, 1);
    assert_eq!(
        first,
        json!({
            "Name": "Alice",
            "Age": 30,
            "City": "Lisbon",
            "Occupation": "Engineer",
            "Skills": "Rust"
        })
    );
    let third = read_record(&output, 3);
    assert_eq!(third["Name"], json!("Carol"));
    assert_eq!(third["Age"], json!(28));
    assert_eq!(third.as_object().unwrap().len(), 5);
    assert!(!output.join("record_4.json").exists());
}

#[test]
fn test_blank_rows_and_columns_are_dropped() {
    let dir = temp_dir("pruning");
    let input = dir.join("sparse.csv");
    fs::write(
        &input,
        "Name,Notes,Age\n\
         Alice,,30\n\
         ,,\n\
         Bob,,41\n",
    )
    .unwrap();

    let output = dir.join("out");
    let mut gate = DuplicateGate::default();
    let written =
        convert_delimited_file(&input, &output, &TabularOptions::default(), &mut gate).unwrap();

    // The all-blank row disappears, and so does the all-blank Notes
    // column.
    assert_eq!(written, 2);
    let first = read_record(&output, 1);
    assert_eq!(first, json!({"Name": "Alice", "Age": 30}));
}

#[test]
fn test_skip_rows_and_column_projection() {
    let dir = temp_dir("skip_project");
    let input = dir.join("export.csv");
    fs::write(
        &input,
        "Export generated 2024-03-15\n\
         source: catalog\n\
         Name,Price,Stock\n\
         Chair,49.5,12\n",
    )
    .unwrap();

    let output = dir.join("out");
    let options = TabularOptions {
        skip_rows: 2,
        fields: Some(vec!["Name".to_string(), "Stock".to_string()]),
        ..Default::default()
    };
    let mut gate = DuplicateGate::default();
    let written = convert_delimited_file(&input, &output, &options, &mut gate).unwrap();
    assert_eq!(written, 1);
    assert_eq!(read_record(&output, 1), json!({"Name": "Chair", "Stock": 12}));
}

#[test]
fn test_unknown_projection_column_is_malformed_spec() {
    let dir = temp_dir("bad_column");
    let input = dir.join("data.csv");
    fs::write(&input, "Name,Age\nAlice,30\n").unwrap();

    let options = TabularOptions {
        fields: Some(vec!["Ghost".to_string()]),
        ..Default::default()
    };
    let mut gate = DuplicateGate::default();
    let result = convert_delimited_file(&input, &dir.join("out"), &options, &mut gate);
    assert!(matches!(result, Err(ConvertError::MalformedSpec(_))));
}

#[test]
fn test_duplicate_rows_suppressed_case_insensitively() {
    let dir = temp_dir("dupe_rows");
    let input = dir.join("drugs.csv");
    fs::write(
        &input,
        "Proper Name,Dose\n\
         Ibuprofen,200 mg\n\
         IBUPROFEN ,400 mg\n\
         Naproxen,250 mg\n",
    )
    .unwrap();

    let output = dir.join("out");
    let options = TabularOptions {
        unique_field: Some("Proper Name".to_string()),
        ..Default::default()
    };
    let mut gate = DuplicateGate::default();
    let written = convert_delimited_file(&input, &output, &options, &mut gate).unwrap();

    // Numbering stays dense: the duplicate leaves no gap.
    assert_eq!(written, 2);
    assert_eq!(read_record(&output, 1)["Proper Name"], json!("Ibuprofen"));
    assert_eq!(read_record(&output, 2)["Proper Name"], json!("Naproxen"));
}

#[test]
fn test_gate_round_trip_across_batches() {
    let dir = temp_dir("round_trip");
    let log = dir.join("processed_names.log");

    // Batch 1 accepts "Foo " and commits.
    let mut gate = DuplicateGate::load(Some(&log)).unwrap();
    assert!(gate.check(Some("Foo ")));
    gate.commit(&log).unwrap();
    assert_eq!(fs::read_to_string(&log).unwrap(), "foo\n");

    // Batch 2 loads fresh and must reject "foo".
    let mut gate = DuplicateGate::load(Some(&log)).unwrap();
    assert!(!gate.check(Some("foo")));
    assert!(!gate.check(Some("  FOO")));
    assert!(gate.check(Some("bar")));

    // Commit appends; it never rewrites earlier entries.
    gate.commit(&log).unwrap();
    assert_eq!(fs::read_to_string(&log).unwrap(), "foo\nbar\n");
}

#[test]
fn test_missing_input_is_input_not_found() {
    let mut gate = DuplicateGate::default();
    let result = convert_delimited_file(
        &PathBuf::from("/no/such/file.csv"),
        &std::env::temp_dir(),
        &TabularOptions::default(),
        &mut gate,
    );
    assert!(matches!(result, Err(ConvertError::InputNotFound(_))));
}
