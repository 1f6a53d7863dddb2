//! Field-name canonicalization for comparison.
//!
//! All matching stages compare normalized forms: lowercase, `[a-z0-9]`
//! only. Unicode decomposition is out of scope; inputs reaching this
//! module are already ASCII-folded by the ingest layer.

use std::collections::BTreeSet;

/// Semantic stems recognized by `word_components`, longest first so the
/// scan below can take the first hit at each position.
const STEMS: &[&str] = &[
    "termination",
    "supervisor",
    "department",
    "timestamp",
    "candidate",
    "personal",
    "position",
    "business",
    "division",
    "employee",
    "activity",
    "location",
    "modified",
    "manager",
    "country",
    "surname",
    "updated",
    "created",
    "family",
    "mobile",
    "middle",
    "number",
    "office",
    "person",
    "status",
    "email",
    "first",
    "given",
    "phone",
    "start",
    "title",
    "work",
    "home",
    "city",
    "code",
    "date",
    "hire",
    "join",
    "last",
    "name",
    "role",
    "site",
    "team",
    "time",
    "unit",
    "user",
    "end",
    "fax",
    "org",
    "url",
    "id",
];

/// Stems that carry enough signal to anchor a partial match on their own.
pub const DISCRIMINATING_STEMS: &[&str] = &["id", "email", "phone", "date", "name"];

/// Canonicalize a field name: lowercase, strip everything outside `[a-z0-9]`.
/// The empty string is a legal result.
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter_map(|ch| {
            let lower = ch.to_ascii_lowercase();
            if lower.is_ascii_lowercase() || lower.is_ascii_digit() {
                Some(lower)
            } else {
                None
            }
        })
        .collect()
}

/// Extract semantic word components from a field name by longest-match
/// scan over the stem vocabulary. "LastActivityTimeStamp" yields
/// {last, activity, timestamp}.
pub fn word_components(s: &str) -> BTreeSet<&'static str> {
    let normalized = normalize(s);
    let bytes = normalized.as_bytes();
    let mut found = BTreeSet::new();
    let mut i = 0;
    while i < bytes.len() {
        let rest = &normalized[i..];
        match STEMS.iter().find(|stem| rest.starts_with(**stem)) {
            Some(stem) => {
                found.insert(*stem);
                i += stem.len();
            }
            None => i += 1,
        }
    }
    found
}

/// Jaccard overlap of two stem sets. Empty-vs-empty is 0.
pub fn stem_jaccard(a: &BTreeSet<&'static str>, b: &BTreeSet<&'static str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}
