//! Entity schema registry.
//!
//! Schemas ship as TOML resources compiled into the binary; a directory
//! override lets deployments extend or replace them without code edits.
//! The registry is created once at process init and never mutated.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::SchemaError;
use crate::fields::{EntitySchema, FieldDefinition};

const BUILTIN_SCHEMAS: &[(&str, &str)] = &[
    (
        "ef_employee.toml",
        include_str!("../resources/ef_employee.toml"),
    ),
    (
        "ef_candidate.toml",
        include_str!("../resources/ef_candidate.toml"),
    ),
    (
        "ef_position.toml",
        include_str!("../resources/ef_position.toml"),
    ),
];

#[derive(Debug, Deserialize)]
struct SchemaFile {
    entity: EntityHeader,
    #[serde(default)]
    fields: Vec<FieldDefinition>,
}

#[derive(Debug, Deserialize)]
struct EntityHeader {
    name: String,
    #[serde(default)]
    description: String,
}

/// Read-only collection of entity schemas plus a content hash that keys
/// the persisted embedding caches.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    entities: Vec<EntitySchema>,
    content_hash: String,
}

impl SchemaRegistry {
    /// Load the compiled-in entity schemas.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_sources(BUILTIN_SCHEMAS.iter().map(|(n, s)| (n.to_string(), s.to_string())))
    }

    /// Load every `*.toml` schema in a directory (sorted for a stable hash).
    pub fn from_dir(dir: &Path) -> Result<Self, SchemaError> {
        let mut sources = Vec::new();
        let entries = std::fs::read_dir(dir).map_err(|e| SchemaError::Parse {
            source_name: dir.display().to_string(),
            message: e.to_string(),
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| SchemaError::Parse {
                source_name: dir.display().to_string(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                let raw = std::fs::read_to_string(&path).map_err(|e| SchemaError::Parse {
                    source_name: path.display().to_string(),
                    message: e.to_string(),
                })?;
                sources.push((path.display().to_string(), raw));
            }
        }
        sources.sort_by(|a, b| a.0.cmp(&b.0));
        if sources.is_empty() {
            return Err(SchemaError::Parse {
                source_name: dir.display().to_string(),
                message: "no .toml schema files found".into(),
            });
        }
        Self::from_sources(sources.into_iter())
    }

    fn from_sources(sources: impl Iterator<Item = (String, String)>) -> Result<Self, SchemaError> {
        let mut entities = Vec::new();
        let mut hasher = Sha256::new();
        for (source_name, raw) in sources {
            hasher.update(raw.as_bytes());
            let file: SchemaFile = toml::from_str(&raw).map_err(|e| SchemaError::Parse {
                source_name: source_name.clone(),
                message: e.to_string(),
            })?;
            entities.push(validate_entity(&source_name, file)?);
        }
        let content_hash = format!("{:x}", hasher.finalize());
        Ok(Self {
            entities,
            content_hash,
        })
    }

    /// Resolve an entity by forgiving name match.
    pub fn get(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.iter().find(|e| e.matches_name(name))
    }

    pub fn entities(&self) -> &[EntitySchema] {
        &self.entities
    }

    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.iter().map(|e| e.name.as_str()).collect()
    }

    /// Hex SHA-256 over the raw schema sources. Embedding caches are keyed
    /// by a prefix of this so they rebuild when schemas change.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }
}

fn validate_entity(source_name: &str, file: SchemaFile) -> Result<EntitySchema, SchemaError> {
    if file.entity.name.trim().is_empty() {
        return Err(SchemaError::Parse {
            source_name: source_name.to_string(),
            message: "entity.name is empty".into(),
        });
    }
    if file.fields.is_empty() {
        return Err(SchemaError::NoFields {
            entity: file.entity.name,
        });
    }
    let mut seen = std::collections::HashSet::new();
    for field in &file.fields {
        if field.name.trim().is_empty() {
            return Err(SchemaError::Parse {
                source_name: source_name.to_string(),
                message: format!("entity '{}' has a field with empty name", file.entity.name),
            });
        }
        if !seen.insert(field.name.clone()) {
            return Err(SchemaError::DuplicateField {
                entity: file.entity.name,
                field: field.name.clone(),
            });
        }
    }
    Ok(EntitySchema {
        name: file.entity.name,
        description: file.entity.description,
        fields: file.fields,
    })
}
