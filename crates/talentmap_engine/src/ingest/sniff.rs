//! Advisory column type sniffing.
//!
//! Works by elimination over a sample: every candidate interpretation
//! starts alive and each non-empty value kills the ones it cannot be.
//! The result is informational only; the resolver and transformer treat
//! target schema types as ground truth.

use once_cell::sync::Lazy;
use regex::Regex;
use talentmap_protocol::{SemanticType, Table};

use crate::dates::parse_temporal;
use crate::ingest::multivalue::LIST_SEPARATOR;

const SAMPLE_CELLS: usize = 200;

pub static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    // RFC 5322 compatible without being a full grammar: printable local
    // part, domain with at least one dot, no whitespace.
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$")
        .expect("email regex is valid")
});

pub fn is_email(value: &str) -> bool {
    EMAIL_RE.is_match(value.trim())
}

const TRUE_LITERALS: [&str; 5] = ["true", "yes", "1", "t", "y"];
const FALSE_LITERALS: [&str; 5] = ["false", "no", "0", "f", "n"];

pub fn is_boolean_literal(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    TRUE_LITERALS.contains(&lowered.as_str()) || FALSE_LITERALS.contains(&lowered.as_str())
}

/// Candidate interpretations still alive for a column.
struct Candidates {
    boolean: bool,
    integer: bool,
    float: bool,
    date: bool,
    email: bool,
    saw_time: bool,
}

impl Candidates {
    fn all() -> Self {
        Self {
            boolean: true,
            integer: true,
            float: true,
            date: true,
            email: true,
            saw_time: false,
        }
    }

    fn none_alive(&self) -> bool {
        !(self.boolean || self.integer || self.float || self.date || self.email)
    }

    fn eliminate(&mut self, value: &str) {
        let trimmed = value.trim();
        if self.boolean && !is_boolean_literal(trimmed) {
            self.boolean = false;
        }
        if self.integer && trimmed.parse::<i64>().is_err() {
            self.integer = false;
        }
        if self.float && trimmed.parse::<f64>().is_err() {
            self.float = false;
        }
        if self.date {
            match parse_temporal(trimmed, None) {
                Some(parsed) => self.saw_time |= parsed.has_time,
                None => self.date = false,
            }
        }
        if self.email {
            // A multi-value cell is an email column if every part is one.
            let all_parts_email = trimmed
                .split(LIST_SEPARATOR)
                .all(|part| !part.trim().is_empty() && is_email(part));
            if !all_parts_email {
                self.email = false;
            }
        }
    }

    /// Most specific surviving interpretation wins.
    fn resolve(&self) -> SemanticType {
        if self.boolean {
            SemanticType::Boolean
        } else if self.integer || self.float {
            SemanticType::Number
        } else if self.date {
            if self.saw_time {
                SemanticType::DateTime
            } else {
                SemanticType::Date
            }
        } else if self.email {
            SemanticType::Email
        } else {
            SemanticType::String
        }
    }
}

/// Fill in `table.column_types` from a sample of each column.
pub fn sniff_types(table: &mut Table) {
    let mut types = Vec::with_capacity(table.columns.len());
    for idx in 0..table.columns.len() {
        let mut candidates = Candidates::all();
        let mut saw_value = false;
        for cell in table.column_values(idx).take(SAMPLE_CELLS) {
            if cell.trim().is_empty() {
                continue;
            }
            saw_value = true;
            candidates.eliminate(cell);
            if candidates.none_alive() {
                break;
            }
        }
        types.push(if saw_value {
            candidates.resolve()
        } else {
            SemanticType::String
        });
    }
    table.column_types = types;
}
