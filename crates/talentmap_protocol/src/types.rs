//! Canonical pipeline payload types shared across all crates.

use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Canonical identifiers
// ============================================================================

/// Opaque identifier for an ingested file held in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = FileIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FileIdError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileIdError {
    #[error("file id cannot be empty")]
    Empty,
}

// ============================================================================
// Semantic types
// ============================================================================

/// Semantic type of a target field (and of sniffed source columns).
/// This is the CANONICAL vocabulary - use this everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SemanticType {
    #[default]
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "list<string>")]
    StringList,
    #[serde(rename = "list<email>")]
    EmailList,
    #[serde(rename = "list<phone>")]
    PhoneList,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::String => "string",
            SemanticType::Number => "number",
            SemanticType::Date => "date",
            SemanticType::DateTime => "datetime",
            SemanticType::Email => "email",
            SemanticType::Boolean => "boolean",
            SemanticType::Url => "url",
            SemanticType::StringList => "list<string>",
            SemanticType::EmailList => "list<email>",
            SemanticType::PhoneList => "list<phone>",
        }
    }

    /// True for list-valued types (cells encode `||`-separated values).
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            SemanticType::StringList | SemanticType::EmailList | SemanticType::PhoneList
        )
    }

    /// True for temporal types.
    pub fn is_temporal(&self) -> bool {
        matches!(self, SemanticType::Date | SemanticType::DateTime)
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SemanticType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "str" | "text" => Ok(SemanticType::String),
            "number" | "numeric" | "integer" | "float" => Ok(SemanticType::Number),
            "date" => Ok(SemanticType::Date),
            "datetime" | "timestamp" => Ok(SemanticType::DateTime),
            "email" => Ok(SemanticType::Email),
            "boolean" | "bool" => Ok(SemanticType::Boolean),
            "url" => Ok(SemanticType::Url),
            "list<string>" | "list" => Ok(SemanticType::StringList),
            "list<email>" => Ok(SemanticType::EmailList),
            "list<phone>" => Ok(SemanticType::PhoneList),
            _ => Err(format!("unknown semantic type: '{}'", s)),
        }
    }
}

// ============================================================================
// Mappings
// ============================================================================

/// How a source column was matched to a target field.
/// Ordering is the resolver's precedence order (exact strongest).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    Exact,
    Alias,
    Partial,
    Semantic,
    Fuzzy,
}

impl MatchMethod {
    pub const ALL: &'static [MatchMethod] = &[
        MatchMethod::Exact,
        MatchMethod::Alias,
        MatchMethod::Partial,
        MatchMethod::Semantic,
        MatchMethod::Fuzzy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Exact => "exact",
            MatchMethod::Alias => "alias",
            MatchMethod::Partial => "partial",
            MatchMethod::Semantic => "semantic",
            MatchMethod::Fuzzy => "fuzzy",
        }
    }

    /// Weight used by entity classification scoring.
    pub fn weight(&self) -> f64 {
        match self {
            MatchMethod::Exact => 1.0,
            MatchMethod::Alias => 0.95,
            MatchMethod::Partial => 0.85,
            MatchMethod::Semantic => 0.7,
            MatchMethod::Fuzzy => 0.6,
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A next-best candidate attached to a committed mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub target: String,
    pub confidence: f64,
    pub method: MatchMethod,
}

/// A resolved `source column -> target field` decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    /// Source column name exactly as it appears in the file header.
    pub source: String,
    /// Canonical target field name within the chosen entity.
    pub target: String,
    /// Calibrated confidence in [0, 1].
    pub confidence: f64,
    pub method: MatchMethod,
    /// Up to three next-best candidates, strongest first.
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

/// Full output of one resolution pass over a source column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResolutionReport {
    pub entity: String,
    pub mappings: Vec<Mapping>,
    pub unmapped_sources: Vec<String>,
    pub unmapped_targets: Vec<String>,
    /// Share of source columns that received a mapping, in [0, 100].
    pub mapping_percentage: f64,
    pub method_counts: BTreeMap<MatchMethod, usize>,
    /// Diagnostics surfaced during resolution (e.g. degraded mode).
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

impl ResolutionReport {
    /// Look up the committed mapping for a target field, if any.
    pub fn mapping_for_target(&self, target: &str) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.target == target)
    }

    pub fn mapping_for_source(&self, source: &str) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.source == source)
    }
}

// ============================================================================
// Tables
// ============================================================================

/// In-memory columnar table built by the ingestor.
///
/// Cells are untyped strings until the transformer coerces them; the empty
/// string stands for null. Row indices 0..N-1 are stable and serve as row
/// identity during data-loss accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Advisory per-column semantic type from ingest-time sniffing.
    pub column_types: Vec<SemanticType>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let column_types = vec![SemanticType::String; columns.len()];
        Self {
            columns,
            rows,
            column_types,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate the cells of one column. Missing trailing cells read as "".
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(move |row| row.get(index).map(String::as_str).unwrap_or(""))
    }
}

/// One column flagged as multi-valued during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiValueColumn {
    pub column: String,
    pub separator: String,
    pub sample_values: Vec<String>,
}

/// Source file format recognized by the ingestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Xlsx,
    Xls,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Csv => write!(f, "csv"),
            SourceFormat::Xlsx => write!(f, "xlsx"),
            SourceFormat::Xls => write!(f, "xls"),
        }
    }
}

/// Everything the ingestor learned while tabulating a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseMetadata {
    pub format: SourceFormat,
    pub encoding: String,
    /// Detected field delimiter; None for spreadsheet sources.
    pub delimiter: Option<char>,
    pub row_count: usize,
    pub column_count: usize,
    pub multi_value_columns: Vec<MultiValueColumn>,
}

impl ParseMetadata {
    pub fn is_multi_value(&self, column: &str) -> bool {
        self.multi_value_columns.iter().any(|m| m.column == column)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Issue severity. Any critical issue blocks transformation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validation issue kinds. SCREAMING_SNAKE_CASE on the wire to match
/// the report surface consumed by drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    EmptyTable,
    DuplicateColumns,
    UnnamedColumns,
    EmptyColumns,
    MisspelledHeader,
    UnknownHeader,
    MissingRequiredField,
    MissingRequiredData,
    InvalidEmail,
    InvalidDate,
    InvalidNumber,
    InvalidBoolean,
    ExceedsMaxLength,
    NullBytes,
}

impl IssueKind {
    /// The severity this kind always carries.
    pub fn severity(&self) -> Severity {
        match self {
            IssueKind::EmptyTable
            | IssueKind::DuplicateColumns
            | IssueKind::UnnamedColumns
            | IssueKind::MissingRequiredField
            | IssueKind::MissingRequiredData => Severity::Critical,
            IssueKind::MisspelledHeader
            | IssueKind::InvalidEmail
            | IssueKind::InvalidDate
            | IssueKind::InvalidNumber
            | IssueKind::InvalidBoolean
            | IssueKind::ExceedsMaxLength
            | IssueKind::NullBytes => Severity::Warning,
            IssueKind::UnknownHeader | IssueKind::EmptyColumns => Severity::Info,
        }
    }
}

/// Which rows an issue touches: every row, a count, or explicit indices.
#[derive(Debug, Clone, PartialEq)]
pub enum AffectedRows {
    All,
    Count(usize),
    Rows(Vec<usize>),
}

impl Serialize for AffectedRows {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AffectedRows::All => serializer.serialize_str("all"),
            AffectedRows::Count(n) => serializer.serialize_u64(*n as u64),
            AffectedRows::Rows(rows) => rows.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AffectedRows {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = AffectedRows;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("\"all\", a row count, or a list of row indices")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                if v == "all" {
                    Ok(AffectedRows::All)
                } else {
                    Err(E::custom(format!("unknown affected_rows value: '{}'", v)))
                }
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(AffectedRows::Count(v as usize))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut rows = Vec::new();
                while let Some(idx) = seq.next_element::<usize>()? {
                    rows.push(idx);
                }
                Ok(AffectedRows::Rows(rows))
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

/// A single finding from the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    /// Source column or target field the issue concerns.
    pub field: String,
    pub description: String,
    pub affected_rows: AffectedRows,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, field: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            severity: kind.severity(),
            kind,
            field: field.into(),
            description: description.into(),
            affected_rows: AffectedRows::All,
            suggestion: None,
        }
    }

    pub fn with_rows(mut self, affected: AffectedRows) -> Self {
        self.affected_rows = affected;
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Collected validation findings plus the overall verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub is_valid: bool,
}

impl ValidationReport {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let is_valid = !issues.iter().any(|i| i.severity == Severity::Critical);
        Self { issues, is_valid }
    }

    pub fn criticals(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
    }

    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

// ============================================================================
// Output formats
// ============================================================================

/// Artifact format produced by the transformer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Xml,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Xml => "xml",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "xml" => Ok(OutputFormat::Xml),
            _ => Err(format!("invalid output format: '{}'. Expected: csv or xml", s)),
        }
    }
}

/// Entity classification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDetection {
    pub entity: String,
    pub confidence: f64,
    /// Score per candidate entity, sorted descending by score.
    pub all_scores: Vec<(String, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_weights_are_ordered() {
        let weights: Vec<f64> = MatchMethod::ALL.iter().map(|m| m.weight()).collect();
        for pair in weights.windows(2) {
            assert!(pair[0] >= pair[1], "weights must not increase: {:?}", weights);
        }
    }

    #[test]
    fn semantic_type_round_trips_through_str() {
        for ty in [
            SemanticType::String,
            SemanticType::Number,
            SemanticType::Date,
            SemanticType::DateTime,
            SemanticType::Email,
            SemanticType::Boolean,
            SemanticType::Url,
            SemanticType::StringList,
            SemanticType::EmailList,
            SemanticType::PhoneList,
        ] {
            assert_eq!(ty.as_str().parse::<SemanticType>().unwrap(), ty);
        }
    }

    #[test]
    fn affected_rows_serde_shapes() {
        let all = serde_json::to_string(&AffectedRows::All).unwrap();
        assert_eq!(all, "\"all\"");
        let count = serde_json::to_string(&AffectedRows::Count(7)).unwrap();
        assert_eq!(count, "7");
        let rows = serde_json::to_string(&AffectedRows::Rows(vec![1, 3])).unwrap();
        assert_eq!(rows, "[1,3]");

        let parsed: AffectedRows = serde_json::from_str("\"all\"").unwrap();
        assert_eq!(parsed, AffectedRows::All);
        let parsed: AffectedRows = serde_json::from_str("12").unwrap();
        assert_eq!(parsed, AffectedRows::Count(12));
        let parsed: AffectedRows = serde_json::from_str("[0,5]").unwrap();
        assert_eq!(parsed, AffectedRows::Rows(vec![0, 5]));
    }

    #[test]
    fn table_column_values_pads_short_rows() {
        let table = Table::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into(), "2".into()], vec!["3".into()]],
        );
        let b: Vec<&str> = table.column_values(1).collect();
        assert_eq!(b, vec!["2", ""]);
    }

    #[test]
    fn validation_report_verdict_follows_severity() {
        let report = ValidationReport::from_issues(vec![ValidationIssue::new(
            IssueKind::InvalidEmail,
            "EMAIL",
            "3 cells are not valid email addresses",
        )]);
        assert!(report.is_valid);

        let report = ValidationReport::from_issues(vec![ValidationIssue::new(
            IssueKind::MissingRequiredField,
            "EMPLOYEE_ID",
            "no source column maps to required field EMPLOYEE_ID",
        )]);
        assert!(!report.is_valid);
        assert_eq!(report.criticals().count(), 1);
    }
}
