//! End-to-end pipeline scenarios: ingest through emitted artifact.

use talentmap::Pipeline;
use talentmap_protocol::{Config, MatchMethod, OutputFormat, PipelineError};

fn pipeline() -> (Pipeline, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config {
        embed_cache_dir: Some(dir.path().to_path_buf()),
        ..Config::default()
    };
    (Pipeline::new(config).expect("pipeline init"), dir)
}

#[test]
fn siemens_style_candidate_file_maps_and_classifies() {
    let (pipeline, _dir) = pipeline();
    let csv = "PersonID,FirstName,LastName,WorkEmails,HomeEmails,WorkPhones,LastActivityTimeStamp\n\
               P-1,Priya,Natarajan,p@x.com,priya@home.net,555-0199,2025-05-20T16:45:00\n";
    let (file_id, metadata) = pipeline.ingest(csv.as_bytes(), "siemens.csv").unwrap();
    assert_eq!(metadata.row_count, 1);

    let detection = pipeline.detect_entity(&file_id).unwrap();
    assert_eq!(detection.entity, "EF_Candidate");

    let report = pipeline.auto_map(&file_id, "candidate").unwrap();
    let expect = [
        ("PersonID", "CANDIDATE_ID", 0.95, MatchMethod::Alias),
        ("FirstName", "FIRST_NAME", 1.0, MatchMethod::Exact),
        ("LastName", "LAST_NAME", 1.0, MatchMethod::Exact),
        ("WorkEmails", "EMAIL", 0.95, MatchMethod::Alias),
        ("WorkPhones", "PHONE", 0.95, MatchMethod::Alias),
        (
            "LastActivityTimeStamp",
            "LAST_ACTIVITY_TS",
            0.95,
            MatchMethod::Alias,
        ),
    ];
    for (source, target, confidence, method) in expect {
        let mapping = report
            .mapping_for_source(source)
            .unwrap_or_else(|| panic!("{source} must be mapped"));
        assert_eq!(mapping.target, target, "{source}");
        assert_eq!(mapping.confidence, confidence, "{source}");
        assert_eq!(mapping.method, method, "{source}");
    }
    // Target uniqueness: the second email column loses the collision.
    assert!(report.unmapped_sources.contains(&"HomeEmails".to_string()));
    assert!(report.mapping_percentage >= 75.0);
}

#[test]
fn multi_value_columns_expand_in_xml() {
    let (pipeline, _dir) = pipeline();
    let csv = "EmployeeID,WorkEmails,WorkPhones\n\
               12345,a@x.com||b@x.com,555-1||555-2\n\
               67890,c@x.com,555-3\n";
    let (file_id, metadata) = pipeline.ingest(csv.as_bytes(), "employees.csv").unwrap();
    assert!(metadata.is_multi_value("WorkEmails"));
    assert!(metadata.is_multi_value("WorkPhones"));

    let mappings = pipeline.auto_map(&file_id, "employee").unwrap().mappings;
    let bytes = pipeline
        .transform(&file_id, "employee", &mappings, OutputFormat::Xml)
        .unwrap();
    let xml = String::from_utf8(bytes).unwrap();

    assert_eq!(xml.matches("<EF_Employee>").count(), 2);
    assert_eq!(xml.matches("<email>").count(), 3);
    assert_eq!(xml.matches("<phone>").count(), 3);
    assert!(xml.contains("<email>a@x.com</email>"));
    assert!(xml.contains("<email>b@x.com</email>"));
    assert!(xml.contains("<phone>555-3</phone>"));
}

#[test]
fn pipe_delimited_file_conserves_all_rows() {
    let (pipeline, _dir) = pipeline();
    let mut csv = String::from("EmployeeID|FirstName|LastName\n");
    for i in 0..1213 {
        csv.push_str(&format!("E{i}|First{i}|Last{i}\n"));
    }
    let (file_id, metadata) = pipeline.ingest(csv.as_bytes(), "export.csv").unwrap();
    assert_eq!(metadata.delimiter, Some('|'));
    assert_eq!(metadata.row_count, 1213);

    let mappings = pipeline.auto_map(&file_id, "employee").unwrap().mappings;
    let bytes = pipeline
        .transform(&file_id, "employee", &mappings, OutputFormat::Csv)
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    assert_eq!(text.lines().count(), 1214, "header plus 1213 records");
}

#[test]
fn windows_1252_content_survives_to_utf8_xml() {
    let (pipeline, _dir) = pipeline();
    // "Torreón" with 0xF3: not valid UTF-8, valid Windows-1252.
    let mut csv: Vec<u8> = b"EmployeeID,FirstName,City\n".to_vec();
    csv.extend_from_slice(b"1,Maria,Torre\xf3n\n");
    let (file_id, metadata) = pipeline.ingest(&csv, "latin.csv").unwrap();
    assert_ne!(metadata.encoding, "UTF-8");

    let mappings = pipeline.auto_map(&file_id, "employee").unwrap().mappings;
    let bytes = pipeline
        .transform(&file_id, "employee", &mappings, OutputFormat::Xml)
        .unwrap();
    let xml = String::from_utf8(bytes).expect("output is UTF-8");
    assert!(xml.contains("Torre\u{f3}n"), "output: {xml}");
}

#[test]
fn canonical_headers_round_trip_through_transform() {
    let (pipeline, _dir) = pipeline();
    let csv = "CANDIDATE_ID,FIRST_NAME,LAST_NAME,STAGE\n\
               C-1,Ada,Lovelace,Onsite\n\
               C-2,Grace,Hopper,Offer\n";
    let (file_id, _) = pipeline.ingest(csv.as_bytes(), "canonical.csv").unwrap();

    let report = pipeline.auto_map(&file_id, "candidate").unwrap();
    assert_eq!(report.mappings.len(), 4);
    for mapping in &report.mappings {
        assert_eq!(mapping.method, MatchMethod::Exact);
        assert_eq!(mapping.confidence, 1.0);
    }

    let bytes = pipeline
        .transform(&file_id, "candidate", &report.mappings, OutputFormat::Csv)
        .unwrap();
    let (round_trip_id, round_trip_meta) = pipeline
        .ingest(&bytes, "round_trip.csv")
        .expect("emitted CSV re-ingests");
    assert_eq!(round_trip_meta.row_count, 2);

    // Values survive coercion (all strings here) and re-resolution maps
    // the canonical headers right back.
    let second = pipeline.auto_map(&round_trip_id, "candidate").unwrap();
    assert_eq!(second.mappings.len(), 4);
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.contains("C-1,Ada,Lovelace,Onsite"));
    assert!(text.contains("C-2,Grace,Hopper,Offer"));
}

#[test]
fn misspelled_header_recovers_and_is_reported() {
    let (pipeline, _dir) = pipeline();
    let csv = "EmployeeID,FirstNme\nE1,Ada\n";
    let (file_id, _) = pipeline.ingest(csv.as_bytes(), "typo.csv").unwrap();

    let report = pipeline.auto_map(&file_id, "employee").unwrap();
    let mapping = report
        .mapping_for_source("FirstNme")
        .expect("typo column still resolves");
    assert_eq!(mapping.target, "FIRST_NAME");
    assert!(mapping.confidence >= 0.70);

    let validation = pipeline
        .validate(&file_id, "employee", &report.mappings)
        .unwrap();
    let issue = validation
        .issues
        .iter()
        .find(|i| i.suggestion.as_deref() == Some("FIRST_NAME"))
        .expect("misspelling suggestion present");
    assert_eq!(issue.field, "FirstNme");
}

#[test]
fn zero_row_file_fails_validation_and_blocks_transform() {
    let (pipeline, _dir) = pipeline();
    let (file_id, metadata) = pipeline
        .ingest(b"EmployeeID,FirstName\n", "empty.csv")
        .unwrap();
    assert_eq!(metadata.row_count, 0);

    let mappings = pipeline.auto_map(&file_id, "employee").unwrap().mappings;
    let validation = pipeline
        .validate(&file_id, "employee", &mappings)
        .unwrap();
    assert!(!validation.is_valid);

    let err = pipeline
        .transform(&file_id, "employee", &mappings, OutputFormat::Csv)
        .unwrap_err();
    assert!(matches!(err, PipelineError::ValidationFailed { .. }));
}

#[test]
fn unknown_entity_and_unknown_file_error_cleanly() {
    let (pipeline, _dir) = pipeline();
    let (file_id, _) = pipeline.ingest(b"a,b\n1,2\n", "ok.csv").unwrap();

    let err = pipeline.auto_map(&file_id, "invoice").unwrap_err();
    assert!(matches!(err, PipelineError::SchemaNotFound { .. }));

    let missing: talentmap_protocol::FileId = "not-a-real-id".parse().unwrap();
    let err = pipeline.detect_entity(&missing).unwrap_err();
    assert!(matches!(err, PipelineError::FileNotFound { .. }));
}

#[test]
fn auto_map_is_idempotent() {
    let (pipeline, _dir) = pipeline();
    let csv = "PersonID,FirstName,WorkEmails\nP-1,Priya,p@x.com\n";
    let (file_id, _) = pipeline.ingest(csv.as_bytes(), "idem.csv").unwrap();
    let a = pipeline.auto_map(&file_id, "candidate").unwrap();
    let b = pipeline.auto_map(&file_id, "candidate").unwrap();
    assert_eq!(a, b);
}

#[test]
fn required_timestamp_defaults_into_output() {
    let (pipeline, _dir) = pipeline();
    let csv = "EmployeeID,FirstName\nE1,Ada\n";
    let (file_id, _) = pipeline.ingest(csv.as_bytes(), "defaults.csv").unwrap();
    let mappings = pipeline.auto_map(&file_id, "employee").unwrap().mappings;
    let bytes = pipeline
        .transform(&file_id, "employee", &mappings, OutputFormat::Csv)
        .unwrap();
    let text = String::from_utf8(bytes).unwrap();
    let header = text.lines().next().unwrap();
    assert!(header.ends_with("LAST_MODIFIED_TS"));
    let row = text.lines().nth(1).unwrap();
    let stamp = row.rsplit(',').next().unwrap();
    // Auto-populated current UTC time in the field's declared shape.
    assert_eq!(stamp.len(), "2025-06-01T08:30:00".len(), "stamp: {stamp}");
    assert!(stamp.contains('T'));
}
