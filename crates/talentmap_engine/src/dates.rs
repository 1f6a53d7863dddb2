//! Multi-format date and datetime parsing.
//!
//! One parse order is shared by the type sniffer, the validator and the
//! transformer so a value judged valid in one stage can never fail in a
//! later one. A field's declared format is always tried first, then the
//! fixed fallback table (ordered by prevalence in HR exports).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// One recognized input format.
#[derive(Debug, Clone, Copy)]
pub struct DateFormatSpec {
    pub pattern: &'static str,
    pub example: &'static str,
    pub has_time: bool,
}

/// Fallback formats, tried in order. US month-first reading wins over
/// day-first for ambiguous values, matching the fixed order ISO-8601,
/// MM/DD/YYYY, DD/MM/YYYY, then timestamped variants.
pub const DATE_FORMATS: &[DateFormatSpec] = &[
    DateFormatSpec {
        pattern: "%Y-%m-%dT%H:%M:%S",
        example: "2024-05-31T16:45:00",
        has_time: true,
    },
    DateFormatSpec {
        pattern: "%Y-%m-%d %H:%M:%S",
        example: "2024-05-31 16:45:00",
        has_time: true,
    },
    DateFormatSpec {
        pattern: "%Y-%m-%d",
        example: "2024-05-31",
        has_time: false,
    },
    DateFormatSpec {
        pattern: "%m/%d/%Y",
        example: "05/31/2024",
        has_time: false,
    },
    DateFormatSpec {
        pattern: "%d/%m/%Y",
        example: "31/05/2024",
        has_time: false,
    },
    DateFormatSpec {
        pattern: "%m/%d/%Y %H:%M:%S",
        example: "05/31/2024 16:45:00",
        has_time: true,
    },
    DateFormatSpec {
        pattern: "%Y/%m/%d",
        example: "2024/05/31",
        has_time: false,
    },
    DateFormatSpec {
        pattern: "%d-%m-%Y",
        example: "31-05-2024",
        has_time: false,
    },
    DateFormatSpec {
        pattern: "%Y%m%d",
        example: "20240531",
        has_time: false,
    },
];

/// A successfully parsed temporal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedTemporal {
    pub value: NaiveDateTime,
    pub has_time: bool,
}

impl ParsedTemporal {
    pub fn as_date_string(&self) -> String {
        self.value.format("%Y-%m-%d").to_string()
    }

    pub fn as_datetime_string(&self) -> String {
        self.value.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

/// Translate a schema-style format ("YYYY-MM-DD") into a chrono pattern.
/// MM is month before the time component and minutes inside it.
pub fn schema_format_to_chrono(format: &str) -> Option<&'static str> {
    match format {
        "YYYY-MM-DD" => Some("%Y-%m-%d"),
        "YYYY-MM-DDTHH:MM:SS" => Some("%Y-%m-%dT%H:%M:%S"),
        "YYYY-MM-DD HH:MM:SS" => Some("%Y-%m-%d %H:%M:%S"),
        "MM/DD/YYYY" => Some("%m/%d/%Y"),
        "DD/MM/YYYY" => Some("%d/%m/%Y"),
        "YYYYMMDD" => Some("%Y%m%d"),
        _ => None,
    }
}

/// Parse a cell against the preferred schema format first, then RFC 3339,
/// then the fallback table. Returns None for unparseable input.
pub fn parse_temporal(raw: &str, preferred_format: Option<&str>) -> Option<ParsedTemporal> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(chrono_fmt) = preferred_format.and_then(schema_format_to_chrono) {
        if let Some(parsed) = parse_with(value, chrono_fmt, chrono_fmt.contains("%H")) {
            return Some(parsed);
        }
    }

    // Full ISO-8601 with offset, e.g. "2024-05-31T16:45:00+02:00".
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(ParsedTemporal {
            value: dt.naive_utc(),
            has_time: true,
        });
    }

    for spec in DATE_FORMATS {
        if let Some(parsed) = parse_with(value, spec.pattern, spec.has_time) {
            return Some(parsed);
        }
    }
    None
}

fn parse_with(value: &str, pattern: &str, has_time: bool) -> Option<ParsedTemporal> {
    if has_time {
        NaiveDateTime::parse_from_str(value, pattern)
            .ok()
            .map(|value| ParsedTemporal {
                value,
                has_time: true,
            })
    } else {
        NaiveDate::parse_from_str(value, pattern)
            .ok()
            .map(|date| ParsedTemporal {
                value: NaiveDateTime::new(date, NaiveTime::MIN),
                has_time: false,
            })
    }
}
