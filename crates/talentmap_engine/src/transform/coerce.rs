//! Cell-level type coercion driven by the target field's semantic type.
//!
//! Coercion never drops a row: an uncoercible value passes through
//! unchanged (the validator has already warned about it), except for
//! booleans which additionally flag the cell.

use chrono::NaiveDateTime;
use talentmap_protocol::SemanticType;
use talentmap_schema::FieldDefinition;

use crate::dates::parse_temporal;
use crate::ingest::multivalue::LIST_SEPARATOR;

const TRUE_LITERALS: [&str; 5] = ["true", "yes", "1", "t", "y"];
const FALSE_LITERALS: [&str; 6] = ["false", "no", "0", "f", "n", "null"];

/// A coerced output cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Scalar(String),
    List(Vec<String>),
}

impl CellValue {
    /// Flat form used by the CSV emitter: lists re-join on `||`.
    pub fn to_flat_string(&self) -> String {
        match self {
            CellValue::Scalar(s) => s.clone(),
            CellValue::List(parts) => parts.join(LIST_SEPARATOR),
        }
    }
}

/// Outcome of coercing a single cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Coercion {
    pub value: CellValue,
    /// Set when a boolean cell was neither a true nor a false literal.
    pub invalid_boolean: bool,
}

impl Coercion {
    fn ok(value: CellValue) -> Self {
        Self {
            value,
            invalid_boolean: false,
        }
    }
}

/// Coerce one raw cell for `field`. `pipe_flagged` says the source
/// column was detected multi-valued on `||` during ingestion.
pub fn coerce(raw: &str, field: &FieldDefinition, pipe_flagged: bool) -> Coercion {
    match field.semantic_type {
        SemanticType::StringList | SemanticType::EmailList | SemanticType::PhoneList => {
            Coercion::ok(CellValue::List(split_list(raw, pipe_flagged)))
        }
        SemanticType::Date => Coercion::ok(CellValue::Scalar(coerce_date(raw, field, false))),
        SemanticType::DateTime => Coercion::ok(CellValue::Scalar(coerce_date(raw, field, true))),
        SemanticType::Boolean => coerce_boolean(raw),
        SemanticType::String
        | SemanticType::Number
        | SemanticType::Email
        | SemanticType::Url => Coercion::ok(CellValue::Scalar(raw.to_string())),
    }
}

/// Default for a required field with no source column. The sentinel
/// "now" produces the current UTC time in the field's output shape.
pub fn default_cell(field: &FieldDefinition, now: &NaiveDateTime) -> CellValue {
    match field.default_value.as_deref() {
        Some("now") if field.semantic_type == SemanticType::DateTime => {
            CellValue::Scalar(now.format("%Y-%m-%dT%H:%M:%S").to_string())
        }
        Some("now") if field.semantic_type == SemanticType::Date => {
            CellValue::Scalar(now.format("%Y-%m-%d").to_string())
        }
        Some(literal) => CellValue::Scalar(literal.to_string()),
        None if field.semantic_type.is_list() => CellValue::List(Vec::new()),
        None => CellValue::Scalar(String::new()),
    }
}

/// `||` takes precedence always; comma splitting only applies when the
/// column was never `||`-flagged. This asymmetry keeps natural-language
/// strings with commas intact in `||`-style exports.
fn split_list(raw: &str, pipe_flagged: bool) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let parts: Vec<String> = if raw.contains(LIST_SEPARATOR) || pipe_flagged {
        raw.split(LIST_SEPARATOR).map(str::trim).map(String::from).collect()
    } else {
        raw.split(',').map(str::trim).map(String::from).collect()
    };
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

fn coerce_date(raw: &str, field: &FieldDefinition, with_time: bool) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match parse_temporal(trimmed, field.format.as_deref()) {
        Some(parsed) if with_time => parsed.as_datetime_string(),
        Some(parsed) => parsed.as_date_string(),
        // Already reported by the validator; pass through rather than
        // losing the value.
        None => raw.to_string(),
    }
}

fn coerce_boolean(raw: &str) -> Coercion {
    let lowered = raw.trim().to_lowercase();
    if TRUE_LITERALS.contains(&lowered.as_str()) {
        Coercion::ok(CellValue::Scalar("true".to_string()))
    } else if lowered.is_empty() || FALSE_LITERALS.contains(&lowered.as_str()) {
        Coercion::ok(CellValue::Scalar("false".to_string()))
    } else {
        Coercion {
            value: CellValue::Scalar(raw.to_string()),
            invalid_boolean: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talentmap_protocol::SemanticType;

    fn field(semantic_type: SemanticType, format: Option<&str>) -> FieldDefinition {
        FieldDefinition {
            name: "F".into(),
            display_name: "F".into(),
            semantic_type,
            required: false,
            max_length: None,
            regex: None,
            format: format.map(String::from),
            example: String::new(),
            description: String::new(),
            default_value: None,
        }
    }

    #[test]
    fn dates_normalize_to_iso() {
        let f = field(SemanticType::Date, Some("YYYY-MM-DD"));
        assert_eq!(
            coerce("05/31/2024", &f, false).value,
            CellValue::Scalar("2024-05-31".into())
        );
        let f = field(SemanticType::DateTime, None);
        assert_eq!(
            coerce("2024-05-31 16:45:00", &f, false).value,
            CellValue::Scalar("2024-05-31T16:45:00".into())
        );
    }

    #[test]
    fn unparseable_date_passes_through() {
        let f = field(SemanticType::Date, None);
        assert_eq!(
            coerce("sometime", &f, false).value,
            CellValue::Scalar("sometime".into())
        );
    }

    #[test]
    fn boolean_literal_sets() {
        let f = field(SemanticType::Boolean, None);
        for raw in ["true", "Yes", "1", "T", "y"] {
            assert_eq!(coerce(raw, &f, false).value, CellValue::Scalar("true".into()));
        }
        for raw in ["false", "No", "0", "F", "n", "", "null", "NULL"] {
            assert_eq!(
                coerce(raw, &f, false).value,
                CellValue::Scalar("false".into()),
                "{raw}"
            );
        }
        let odd = coerce("maybe", &f, false);
        assert!(odd.invalid_boolean);
        assert_eq!(odd.value, CellValue::Scalar("maybe".into()));
    }

    #[test]
    fn double_pipe_splits_and_trims() {
        let f = field(SemanticType::EmailList, None);
        assert_eq!(
            coerce("a@x.com || b@x.com||", &f, true).value,
            CellValue::List(vec!["a@x.com".into(), "b@x.com".into()])
        );
    }

    #[test]
    fn single_value_in_flagged_column_stays_whole() {
        let f = field(SemanticType::PhoneList, None);
        assert_eq!(
            coerce("555-3", &f, true).value,
            CellValue::List(vec!["555-3".into()])
        );
    }

    #[test]
    fn comma_fallback_only_without_pipe_flag() {
        let f = field(SemanticType::StringList, None);
        assert_eq!(
            coerce("red, green, blue", &f, false).value,
            CellValue::List(vec!["red".into(), "green".into(), "blue".into()])
        );
        // Same cell in a ||-flagged column: commas are data.
        assert_eq!(
            coerce("red, green, blue", &f, true).value,
            CellValue::List(vec!["red, green, blue".into()])
        );
    }

    #[test]
    fn now_default_follows_field_shape() {
        let now = chrono::NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let mut f = field(SemanticType::DateTime, Some("YYYY-MM-DDTHH:MM:SS"));
        f.default_value = Some("now".into());
        assert_eq!(
            default_cell(&f, &now),
            CellValue::Scalar("2025-06-01T08:30:00".into())
        );
        let mut f = field(SemanticType::String, None);
        f.default_value = Some("unknown".into());
        assert_eq!(default_cell(&f, &now), CellValue::Scalar("unknown".into()));
    }
}
