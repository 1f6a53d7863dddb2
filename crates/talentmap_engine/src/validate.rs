//! Pre-transformation validation.
//!
//! Produces a `ValidationReport` over (table, entity, mappings). Any
//! critical issue flips `is_valid` to false and the transformer refuses
//! to run. Warnings and info findings never block.

use std::collections::{HashMap, HashSet};

use talentmap_protocol::{
    AffectedRows, IssueKind, Mapping, MatchMethod, PipelineError, PipelineResult, SemanticType,
    Table, ValidationIssue, ValidationReport,
};
use talentmap_schema::{levenshtein_ratio, normalize, EntitySchema};

use crate::dates::parse_temporal;
use crate::ingest::multivalue::LIST_SEPARATOR;
use crate::ingest::sniff::is_email;

/// Header typo suggestions require at least this similarity.
const MISSPELLING_RATIO: f64 = 0.80;
/// Row indices reported per issue before switching to a count.
const MAX_REPORTED_ROWS: usize = 10;

/// Structural sanity of the mappings themselves. Violations are not
/// validation findings but hard errors: the caller handed us a mapping
/// set that can never be applied.
pub fn check_mappings(
    table: &Table,
    schema: &EntitySchema,
    mappings: &[Mapping],
) -> PipelineResult<()> {
    let mut seen_targets = HashSet::new();
    let mut seen_sources = HashSet::new();
    for mapping in mappings {
        if schema.field(&mapping.target).is_none() {
            return Err(PipelineError::InvalidMappings {
                message: format!(
                    "target field '{}' does not exist in entity {}",
                    mapping.target, schema.name
                ),
            });
        }
        if table.column_index(&mapping.source).is_none() {
            return Err(PipelineError::InvalidMappings {
                message: format!("source column '{}' does not exist in the file", mapping.source),
            });
        }
        if !seen_targets.insert(mapping.target.as_str()) {
            return Err(PipelineError::InvalidMappings {
                message: format!("two mappings claim target field '{}'", mapping.target),
            });
        }
        if !seen_sources.insert(mapping.source.as_str()) {
            return Err(PipelineError::InvalidMappings {
                message: format!("source column '{}' is mapped twice", mapping.source),
            });
        }
    }
    Ok(())
}

/// Run every check and assemble the report.
pub fn validate(table: &Table, schema: &EntitySchema, mappings: &[Mapping]) -> ValidationReport {
    let mut issues = Vec::new();

    check_structure(table, &mut issues);
    check_headers(table, schema, mappings, &mut issues);
    check_required(table, schema, mappings, &mut issues);
    check_typed(table, schema, mappings, &mut issues);
    check_lengths(table, schema, mappings, &mut issues);
    check_characters(table, &mut issues);

    ValidationReport::from_issues(issues)
}

fn check_structure(table: &Table, issues: &mut Vec<ValidationIssue>) {
    if table.row_count() == 0 {
        issues.push(ValidationIssue::new(
            IssueKind::EmptyTable,
            "(table)",
            "file contains a header but no data rows",
        ));
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for column in &table.columns {
        *counts.entry(column.as_str()).or_insert(0) += 1;
    }
    let mut duplicates: Vec<&str> = counts
        .iter()
        .filter(|(name, count)| **count > 1 && !name.is_empty())
        .map(|(name, _)| *name)
        .collect();
    duplicates.sort_unstable();
    for name in duplicates {
        issues.push(ValidationIssue::new(
            IssueKind::DuplicateColumns,
            name,
            format!("column '{}' appears more than once", name),
        ));
    }

    let unnamed = table.columns.iter().filter(|c| c.trim().is_empty()).count();
    if unnamed > 0 {
        issues.push(ValidationIssue::new(
            IssueKind::UnnamedColumns,
            "(table)",
            format!("{} column(s) have no name", unnamed),
        ));
    }

    for (idx, column) in table.columns.iter().enumerate() {
        if column.trim().is_empty() || table.row_count() == 0 {
            continue;
        }
        if table.column_values(idx).all(|cell| cell.trim().is_empty()) {
            issues.push(ValidationIssue::new(
                IssueKind::EmptyColumns,
                column.as_str(),
                format!("column '{}' is entirely empty", column),
            ));
        }
    }
}

/// Header reconciliation: typo suggestions for unmapped columns, and an
/// explicit misspelling note for columns that only matched fuzzily.
fn check_headers(
    table: &Table,
    schema: &EntitySchema,
    mappings: &[Mapping],
    issues: &mut Vec<ValidationIssue>,
) {
    let mapped_sources: HashMap<&str, &Mapping> =
        mappings.iter().map(|m| (m.source.as_str(), m)).collect();

    for column in &table.columns {
        if column.trim().is_empty() {
            continue;
        }
        match mapped_sources.get(column.as_str()) {
            Some(mapping) => {
                let normalized = normalize(column);
                let target_norm = normalize(&mapping.target);
                if mapping.method != MatchMethod::Exact
                    && mapping.method != MatchMethod::Alias
                    && normalized != target_norm
                    && levenshtein_ratio(&normalized, &target_norm) >= MISSPELLING_RATIO
                {
                    issues.push(
                        ValidationIssue::new(
                            IssueKind::MisspelledHeader,
                            column.as_str(),
                            format!(
                                "header '{}' looks like a misspelling of '{}'",
                                column, mapping.target
                            ),
                        )
                        .with_suggestion(mapping.target.clone()),
                    );
                }
            }
            None => {
                let normalized = normalize(column);
                let best = schema
                    .fields
                    .iter()
                    .map(|f| {
                        let ratio = levenshtein_ratio(&normalized, &normalize(&f.display_name))
                            .max(levenshtein_ratio(&normalized, &normalize(&f.name)));
                        (f, ratio)
                    })
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
                match best {
                    Some((field, ratio)) if ratio >= MISSPELLING_RATIO => {
                        issues.push(
                            ValidationIssue::new(
                                IssueKind::MisspelledHeader,
                                column.as_str(),
                                format!(
                                    "header '{}' looks like a misspelling of '{}'",
                                    column, field.name
                                ),
                            )
                            .with_suggestion(field.name.clone()),
                        );
                    }
                    _ => {
                        issues.push(ValidationIssue::new(
                            IssueKind::UnknownHeader,
                            column.as_str(),
                            format!("header '{}' matches no target field", column),
                        ));
                    }
                }
            }
        }
    }
}

fn check_required(
    table: &Table,
    schema: &EntitySchema,
    mappings: &[Mapping],
    issues: &mut Vec<ValidationIssue>,
) {
    for field in schema.required_fields() {
        let mapping = mappings.iter().find(|m| m.target == field.name);
        match mapping {
            None => {
                // A declared default satisfies the requirement.
                if field.default_value.is_none() {
                    issues.push(ValidationIssue::new(
                        IssueKind::MissingRequiredField,
                        field.name.as_str(),
                        format!(
                            "no source column maps to required field '{}'",
                            field.name
                        ),
                    ));
                }
            }
            Some(mapping) => {
                let Some(idx) = table.column_index(&mapping.source) else {
                    continue;
                };
                let empty: Vec<usize> = table
                    .column_values(idx)
                    .enumerate()
                    .filter(|(_, cell)| cell.trim().is_empty())
                    .map(|(row, _)| row)
                    .collect();
                if !empty.is_empty() {
                    let affected = if empty.len() <= MAX_REPORTED_ROWS {
                        AffectedRows::Rows(empty.clone())
                    } else {
                        AffectedRows::Count(empty.len())
                    };
                    issues.push(
                        ValidationIssue::new(
                            IssueKind::MissingRequiredData,
                            field.name.as_str(),
                            format!(
                                "required field '{}' is empty in {} row(s) of source column '{}'",
                                field.name,
                                empty.len(),
                                mapping.source
                            ),
                        )
                        .with_rows(affected),
                    );
                }
            }
        }
    }
}

fn check_typed(
    table: &Table,
    schema: &EntitySchema,
    mappings: &[Mapping],
    issues: &mut Vec<ValidationIssue>,
) {
    for mapping in mappings {
        let Some(field) = schema.field(&mapping.target) else {
            continue;
        };
        let Some(idx) = table.column_index(&mapping.source) else {
            continue;
        };

        match field.semantic_type {
            SemanticType::Email | SemanticType::EmailList => {
                let bad = count_invalid(table, idx, |cell| {
                    cell.split(LIST_SEPARATOR)
                        .filter(|part| !part.trim().is_empty())
                        .all(is_email)
                });
                if bad > 0 {
                    issues.push(
                        ValidationIssue::new(
                            IssueKind::InvalidEmail,
                            field.name.as_str(),
                            format!(
                                "{} cell(s) in '{}' are not valid email addresses",
                                bad, mapping.source
                            ),
                        )
                        .with_rows(AffectedRows::Count(bad)),
                    );
                }
            }
            SemanticType::Date | SemanticType::DateTime => {
                let format = field.format.as_deref();
                let bad = count_invalid(table, idx, |cell| parse_temporal(cell, format).is_some());
                if bad > 0 {
                    issues.push(
                        ValidationIssue::new(
                            IssueKind::InvalidDate,
                            field.name.as_str(),
                            format!(
                                "{} cell(s) in '{}' could not be parsed as dates",
                                bad, mapping.source
                            ),
                        )
                        .with_rows(AffectedRows::Count(bad)),
                    );
                }
            }
            SemanticType::Number => {
                let bad = count_invalid(table, idx, |cell| cell.trim().parse::<f64>().is_ok());
                if bad > 0 {
                    issues.push(
                        ValidationIssue::new(
                            IssueKind::InvalidNumber,
                            field.name.as_str(),
                            format!(
                                "{} cell(s) in '{}' are not numeric",
                                bad, mapping.source
                            ),
                        )
                        .with_rows(AffectedRows::Count(bad)),
                    );
                }
            }
            _ => {}
        }
    }
}

/// Count non-empty cells in a column failing `valid`.
fn count_invalid(table: &Table, idx: usize, valid: impl Fn(&str) -> bool) -> usize {
    table
        .column_values(idx)
        .filter(|cell| !cell.trim().is_empty() && !valid(cell))
        .count()
}

fn check_lengths(
    table: &Table,
    schema: &EntitySchema,
    mappings: &[Mapping],
    issues: &mut Vec<ValidationIssue>,
) {
    for mapping in mappings {
        let Some(field) = schema.field(&mapping.target) else {
            continue;
        };
        let Some(max_length) = field.max_length else {
            continue;
        };
        let Some(idx) = table.column_index(&mapping.source) else {
            continue;
        };
        let over = table
            .column_values(idx)
            .filter(|cell| cell.chars().count() > max_length)
            .count();
        if over > 0 {
            issues.push(
                ValidationIssue::new(
                    IssueKind::ExceedsMaxLength,
                    field.name.as_str(),
                    format!(
                        "{} cell(s) in '{}' exceed the maximum length of {}",
                        over, mapping.source, max_length
                    ),
                )
                .with_rows(AffectedRows::Count(over)),
            );
        }
    }
}

fn check_characters(table: &Table, issues: &mut Vec<ValidationIssue>) {
    for (idx, column) in table.columns.iter().enumerate() {
        let bad = table
            .column_values(idx)
            .filter(|cell| cell.chars().any(is_forbidden_control))
            .count();
        if bad > 0 {
            issues.push(
                ValidationIssue::new(
                    IssueKind::NullBytes,
                    column.as_str(),
                    format!(
                        "{} cell(s) in '{}' contain null bytes or control characters",
                        bad, column
                    ),
                )
                .with_rows(AffectedRows::Count(bad)),
            );
        }
    }
}

/// C0 controls are forbidden except the whitespace trio, which quoted
/// CSV cells may legitimately contain.
fn is_forbidden_control(ch: char) -> bool {
    ch.is_control() && !matches!(ch, '\t' | '\n' | '\r')
}

#[cfg(test)]
mod tests {
    use super::*;
    use talentmap_protocol::Severity;
    use talentmap_schema::SchemaRegistry;

    fn schema() -> EntitySchema {
        SchemaRegistry::builtin()
            .unwrap()
            .get("employee")
            .unwrap()
            .clone()
    }

    fn mapping(source: &str, target: &str, method: MatchMethod) -> Mapping {
        Mapping {
            source: source.into(),
            target: target.into(),
            confidence: 1.0,
            method,
            alternatives: Vec::new(),
        }
    }

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn zero_row_table_is_critical() {
        let t = table(&["EmployeeID"], &[]);
        let report = validate(&t, &schema(), &[]);
        assert!(!report.is_valid);
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::EmptyTable && i.severity == Severity::Critical));
    }

    #[test]
    fn missing_required_field_is_critical() {
        let t = table(&["FirstName"], &[&["Ada"]]);
        let mappings = vec![mapping("FirstName", "FIRST_NAME", MatchMethod::Exact)];
        let report = validate(&t, &schema(), &mappings);
        assert!(!report.is_valid);
        let issue = report
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::MissingRequiredField)
            .expect("missing required field reported");
        assert_eq!(issue.field, "EMPLOYEE_ID");
    }

    #[test]
    fn required_field_with_default_is_satisfied() {
        // LAST_MODIFIED_TS is required but declares default_value = "now":
        // its absence must not be critical.
        let t = table(
            &["EmployeeID", "FirstName", "LastName"],
            &[&["1", "Ada", "Lovelace"]],
        );
        let mappings = vec![
            mapping("EmployeeID", "EMPLOYEE_ID", MatchMethod::Exact),
            mapping("FirstName", "FIRST_NAME", MatchMethod::Exact),
            mapping("LastName", "LAST_NAME", MatchMethod::Exact),
        ];
        let report = validate(&t, &schema(), &mappings);
        assert!(report.is_valid, "issues: {:?}", report.issues);
    }

    #[test]
    fn empty_required_cells_are_critical_with_rows() {
        let t = table(
            &["EmployeeID", "FirstName", "LastName"],
            &[&["1", "Ada", "Lovelace"], &["", "Grace", "Hopper"]],
        );
        let mappings = vec![
            mapping("EmployeeID", "EMPLOYEE_ID", MatchMethod::Exact),
            mapping("FirstName", "FIRST_NAME", MatchMethod::Exact),
            mapping("LastName", "LAST_NAME", MatchMethod::Exact),
        ];
        let report = validate(&t, &schema(), &mappings);
        assert!(!report.is_valid);
        let issue = report
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::MissingRequiredData)
            .unwrap();
        assert_eq!(issue.affected_rows, AffectedRows::Rows(vec![1]));
    }

    #[test]
    fn misspelled_header_gets_a_suggestion() {
        let t = table(&["FirstNme"], &[&["Ada"]]);
        let report = validate(&t, &schema(), &[]);
        let issue = report
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::MisspelledHeader)
            .expect("misspelling reported");
        assert_eq!(issue.suggestion.as_deref(), Some("FIRST_NAME"));
    }

    #[test]
    fn fuzzy_mapped_header_still_reports_misspelling() {
        let t = table(&["FirstNme"], &[&["Ada"]]);
        let mappings = vec![mapping("FirstNme", "FIRST_NAME", MatchMethod::Fuzzy)];
        let report = validate(&t, &schema(), &mappings);
        let issue = report
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::MisspelledHeader)
            .expect("misspelling reported for fuzzy mapping");
        assert_eq!(issue.suggestion.as_deref(), Some("FIRST_NAME"));
    }

    #[test]
    fn unknown_header_is_informational() {
        let t = table(&["FavouriteColor"], &[&["teal"]]);
        let report = validate(&t, &schema(), &[]);
        let issue = report
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::UnknownHeader)
            .unwrap();
        assert_eq!(issue.severity, Severity::Info);
    }

    #[test]
    fn invalid_emails_and_dates_warn_without_blocking() {
        let t = table(
            &["EmployeeID", "FirstName", "LastName", "Work Email", "Start Date"],
            &[
                &["1", "Ada", "Lovelace", "ada@calc.org", "2024-01-02"],
                &["2", "Grace", "Hopper", "not-an-email", "never"],
            ],
        );
        let mappings = vec![
            mapping("EmployeeID", "EMPLOYEE_ID", MatchMethod::Exact),
            mapping("FirstName", "FIRST_NAME", MatchMethod::Exact),
            mapping("LastName", "LAST_NAME", MatchMethod::Exact),
            mapping("Work Email", "EMAIL", MatchMethod::Alias),
            mapping("Start Date", "HIRE_DATE", MatchMethod::Alias),
        ];
        let report = validate(&t, &schema(), &mappings);
        assert!(report.is_valid, "issues: {:?}", report.issues);
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::InvalidEmail));
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::InvalidDate));
    }

    #[test]
    fn duplicate_columns_are_critical() {
        let t = table(&["EmployeeID", "EmployeeID"], &[&["1", "2"]]);
        let report = validate(&t, &schema(), &[]);
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::DuplicateColumns && i.severity == Severity::Critical));
    }

    #[test]
    fn control_characters_warn() {
        let t = table(&["FirstName"], &[&["Ada\u{0}"]]);
        let report = validate(&t, &schema(), &[]);
        assert!(report.issues.iter().any(|i| i.kind == IssueKind::NullBytes));
    }

    #[test]
    fn check_mappings_rejects_duplicate_targets() {
        let t = table(&["a", "b"], &[&["1", "2"]]);
        let mappings = vec![
            mapping("a", "EMAIL", MatchMethod::Alias),
            mapping("b", "EMAIL", MatchMethod::Alias),
        ];
        let err = check_mappings(&t, &schema(), &mappings).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidMappings { .. }));
    }

    #[test]
    fn check_mappings_rejects_unknown_target() {
        let t = table(&["a"], &[&["1"]]);
        let mappings = vec![mapping("a", "NOT_A_FIELD", MatchMethod::Exact)];
        let err = check_mappings(&t, &schema(), &mappings).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidMappings { .. }));
    }
}
