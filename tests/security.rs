mod common;

use std::fs;

use access_ingest::{
    config::SecurityLimits,
    error::{ParseError, SecurityError},
    security::SecurityValidator,
};
use common::TestWorkspace;

fn validator() -> SecurityValidator {
    SecurityValidator::new(SecurityLimits::default())
}

#[test]
fn plain_csv_is_accepted_with_file_info() {
    let content = b"user_id,door_id,timestamp\n1,101,2023-01-01 10:00:00\n2,102,2023-01-01 10:05:00";
    let report = validator().validate(content, "test.csv");
    assert!(report.is_valid(), "{:?}", report.report.errors);
    assert!(report.report.errors.is_empty());
    let info = report.file_info.expect("file info on success");
    assert_eq!(info.row_count, 2);
    assert_eq!(info.column_count, 3);
    assert_eq!(info.column_names, vec!["user_id", "door_id", "timestamp"]);
    assert_eq!(info.size_bytes, content.len());
    assert_eq!(info.file_hash.len(), 16);
}

#[test]
fn json_object_is_accepted() {
    let report = validator().validate(br#"{"user_id": 1, "door_id": 101}"#, "test.json");
    assert!(report.is_valid(), "{:?}", report.report.errors);
    assert_eq!(report.file_info.unwrap().row_count, 1);
}

#[test]
fn json_array_of_records_is_accepted() {
    let content = br#"[{"user_id": 1, "door_id": 101}, {"user_id": 2, "door_id": 102}]"#;
    let report = validator().validate(content, "events.JSON");
    assert!(report.is_valid(), "{:?}", report.report.errors);
    assert_eq!(report.file_info.unwrap().row_count, 2);
}

#[test]
fn executable_header_is_rejected() {
    let mut content = vec![0x4D, 0x5A, 0x90, 0x00];
    content.extend_from_slice(b"fake data");
    let report = validator().validate(&content, "fake.csv");
    assert!(!report.is_valid());
    assert!(report.file_info.is_none());
    assert!(!report.report.errors.is_empty());
}

#[test]
fn script_injection_is_rejected() {
    let content = b"user_id,door_id,timestamp\n<script>alert('xss')</script>,101,2023-01-01 10:00:00\n";
    let err = validator().screen(content, "test.csv").unwrap_err();
    match err {
        SecurityError::MaliciousContent { threats } => {
            assert!(threats.iter().any(|t| t.contains("script tag")));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn executable_extension_is_rejected() {
    let content = b"user_id,door_id,timestamp\n1,101,2023-01-01 10:00:00\n";
    let err = validator().screen(content, "test.exe").unwrap_err();
    assert!(matches!(err, SecurityError::DisallowedExtension { .. }));
    assert!(err.to_string().contains(".csv"));
}

#[test]
fn extension_check_is_case_insensitive() {
    let content = b"user_id,door_id\n1,101\n";
    assert!(validator().validate(content, "UPPER.CSV").is_valid());
    assert!(validator().validate(content, "notes.txt").is_valid());
}

#[test]
fn oversized_upload_is_rejected_before_parsing() {
    let limits = SecurityLimits {
        max_file_size: 16,
        ..SecurityLimits::default()
    };
    let validator = SecurityValidator::new(limits);
    let err = validator
        .screen(b"user_id,door_id\n1,101\n2,102\n", "big.exe")
        .unwrap_err();
    assert!(matches!(err, SecurityError::FileTooLarge { max: 16, .. }));
}

#[test]
fn prototype_pollution_key_is_rejected() {
    let content = br#"{"__proto__": {"admin": true}, "user_id": 1}"#;
    let err = validator().screen(content, "test.json").unwrap_err();
    assert!(matches!(err, SecurityError::MaliciousContent { .. }));
}

#[test]
fn deep_json_nesting_is_rejected() {
    let mut content = String::new();
    for _ in 0..15 {
        content.push_str(r#"{"a": "#);
    }
    content.push('1');
    for _ in 0..15 {
        content.push('}');
    }
    let err = validator().screen(content.as_bytes(), "deep.json").unwrap_err();
    match err {
        SecurityError::MaliciousContent { threats } => {
            assert!(threats.iter().any(|t| t.contains("15 levels")));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn truncated_json_is_a_structure_error() {
    let err = validator()
        .screen(br#"[{"user_id": 1, "door_id": "#, "broken.json")
        .unwrap_err();
    assert!(matches!(err, SecurityError::Structure(ParseError::MalformedJson(_))));
}

#[test]
fn inconsistent_json_records_are_rejected() {
    let content = br#"[{"user_id": 1, "door_id": 101}, {"user_id": 2}]"#;
    let err = validator().screen(content, "mixed.json").unwrap_err();
    assert!(matches!(
        err,
        SecurityError::Structure(ParseError::InconsistentSchema { row: 2 })
    ));
}

#[test]
fn every_threat_is_listed() {
    let content = b"note\njavascript:alert(1)\n../../etc/passwd\n<% include %>\n";
    let report = validator().validate(content, "notes.csv");
    assert!(!report.is_valid());
    assert!(report.report.errors.len() >= 3, "{:?}", report.report.errors);
}

#[test]
fn report_serializes_with_camel_case_keys() {
    let report = validator().validate(b"user_id\n1\n", "ids.csv");
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["isValid"], true);
    assert_eq!(json["fileInfo"]["rowCount"], 1);
    assert!(json["errors"].as_array().unwrap().is_empty());
}

fn staged_files(workspace: &TestWorkspace) -> usize {
    fs::read_dir(workspace.path()).expect("read staging dir").count()
}

#[test]
fn staged_upload_is_removed_after_accepted_upload() {
    let workspace = TestWorkspace::new();
    let validator = validator().with_staging_dir(workspace.path());
    let screened = validator
        .screen(b"user,door\nu1,d1\n", "events.csv")
        .expect("clean upload");
    assert_eq!(screened.info.row_count, 1);
    assert_eq!(staged_files(&workspace), 0);
}

#[test]
fn staged_upload_is_removed_after_rejected_upload() {
    let workspace = TestWorkspace::new();
    let validator = validator().with_staging_dir(workspace.path());

    let malformed = validator.screen(br#"{"user": "a""#, "events.json");
    assert!(matches!(malformed, Err(SecurityError::Structure(_))));
    assert_eq!(staged_files(&workspace), 0);

    let hostile = validator.screen(b"user,door\n<script>x</script>,d1\n", "events.csv");
    assert!(matches!(hostile, Err(SecurityError::MaliciousContent { .. })));
    assert_eq!(staged_files(&workspace), 0);
}

#[test]
fn control_character_flood_is_rejected() {
    let mut content = b"user,door\n".to_vec();
    for _ in 0..20 {
        content.extend_from_slice(b"u\x01\x01,d\x01\x01\n");
    }
    match validator().screen(&content, "events.csv") {
        Err(SecurityError::MaliciousContent { threats }) => {
            assert!(
                threats.iter().any(|t| t.contains("control characters")),
                "{threats:?}"
            );
        }
        other => panic!("expected malicious content, got {other:?}"),
    }
}
