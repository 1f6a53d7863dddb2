//! Target entity schema types.
//!
//! An `EntitySchema` is a locked, ordered list of field definitions.
//! Once loaded it is a contract: the resolver maps onto it, the validator
//! checks against it, and the transformer emits exactly its field order.
//! Nothing mutates a schema after load.

use serde::{Deserialize, Serialize};
use talentmap_protocol::SemanticType;

use crate::normalize::normalize;

/// One field of a target entity. Immutable after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Canonical identifier, unique within the entity (e.g. "FIRST_NAME").
    pub name: String,
    pub display_name: String,
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    // Reserved for schema-driven per-value pattern checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    /// Value format, e.g. "YYYY-MM-DD" for dates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub example: String,
    #[serde(default)]
    pub description: String,
    /// Fallback emitted when no source maps to a required field.
    /// The sentinel "now" asks for the current UTC time in `format`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl FieldDefinition {
    /// Lowercase form used for XML element names (`EMAIL` -> `<email>`).
    pub fn xml_name(&self) -> String {
        self.name.to_lowercase()
    }
}

/// A named, ordered collection of field definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Entity identifier as emitted in XML (e.g. "EF_Employee").
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub fields: Vec<FieldDefinition>,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.required)
    }

    /// Case/separator-insensitive entity lookup. "employee" and
    /// "ef_employee" both address "EF_Employee".
    pub fn matches_name(&self, query: &str) -> bool {
        let own = normalize(&self.name);
        let query = normalize(query);
        if query.is_empty() {
            return false;
        }
        own == query || own == format!("ef{}", query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> EntitySchema {
        EntitySchema {
            name: "EF_Employee".into(),
            description: String::new(),
            fields: vec![FieldDefinition {
                name: "EMPLOYEE_ID".into(),
                display_name: "Employee ID".into(),
                semantic_type: SemanticType::String,
                required: true,
                max_length: Some(64),
                regex: None,
                format: None,
                example: "E10452".into(),
                description: String::new(),
                default_value: None,
            }],
        }
    }

    #[test]
    fn entity_name_matching_is_forgiving() {
        let schema = schema();
        assert!(schema.matches_name("EF_Employee"));
        assert!(schema.matches_name("employee"));
        assert!(schema.matches_name("Employee"));
        assert!(schema.matches_name("ef-employee"));
        assert!(!schema.matches_name("candidate"));
        assert!(!schema.matches_name(""));
    }

    #[test]
    fn xml_name_is_lowercased() {
        let schema = schema();
        assert_eq!(schema.fields[0].xml_name(), "employee_id");
    }
}
