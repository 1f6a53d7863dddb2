//! Alias dictionary: known synonyms for target field names.
//!
//! Aliases are data, not code. They ship as a TOML resource mapping
//! `target -> [aliases...]` per entity; adding a synonym never requires a
//! code edit. At load time a reverse index `normalize(alias) -> target`
//! is built per entity. A normalized alias claiming two targets within
//! one entity is a configuration error and fails loading.

use std::collections::{BTreeMap, HashMap};

use crate::error::SchemaError;
use crate::normalize::normalize;
use crate::registry::SchemaRegistry;

const BUILTIN_ALIASES: &str = include_str!("../resources/aliases.toml");

type RawAliasFile = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Per-entity alias table with a precomputed normalized reverse index.
#[derive(Debug, Clone, Default)]
pub struct EntityAliases {
    /// Raw alias strings per target, as loaded.
    by_target: BTreeMap<String, Vec<String>>,
    /// normalize(alias) -> target field name.
    reverse: HashMap<String, String>,
}

impl EntityAliases {
    /// O(1) lookup of a normalized source column name.
    pub fn lookup_alias(&self, norm_source: &str) -> Option<&str> {
        self.reverse.get(norm_source).map(String::as_str)
    }

    pub fn aliases_for(&self, target: &str) -> &[String] {
        self.by_target
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// All alias tables, keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct AliasDictionary {
    by_entity: BTreeMap<String, EntityAliases>,
}

impl AliasDictionary {
    /// Load the compiled-in alias tables, checking targets against the
    /// registry and rejecting ambiguous aliases.
    pub fn builtin(registry: &SchemaRegistry) -> Result<Self, SchemaError> {
        Self::from_str(BUILTIN_ALIASES, registry)
    }

    pub fn from_str(raw: &str, registry: &SchemaRegistry) -> Result<Self, SchemaError> {
        let parsed: RawAliasFile = toml::from_str(raw).map_err(|e| SchemaError::Parse {
            source_name: "aliases".into(),
            message: e.to_string(),
        })?;

        let mut by_entity = BTreeMap::new();
        for (entity_name, targets) in parsed {
            let schema = registry
                .get(&entity_name)
                .ok_or_else(|| SchemaError::UnknownAliasEntity {
                    entity: entity_name.clone(),
                })?;

            let mut entry = EntityAliases::default();
            for (target, aliases) in targets {
                if schema.field(&target).is_none() {
                    return Err(SchemaError::UnknownAliasTarget {
                        entity: entity_name.clone(),
                        target,
                    });
                }
                for alias in &aliases {
                    let norm = normalize(alias);
                    if norm.is_empty() {
                        return Err(SchemaError::Parse {
                            source_name: "aliases".into(),
                            message: format!(
                                "alias '{}' for {}.{} normalizes to nothing",
                                alias, entity_name, target
                            ),
                        });
                    }
                    if let Some(existing) = entry.reverse.get(&norm) {
                        if existing != &target {
                            return Err(SchemaError::DuplicateAlias {
                                entity: entity_name.clone(),
                                alias: alias.clone(),
                                first: existing.clone(),
                                second: target.clone(),
                            });
                        }
                    }
                    entry.reverse.insert(norm, target.clone());
                }
                entry.by_target.insert(target, aliases);
            }
            by_entity.insert(schema.name.clone(), entry);
        }

        Ok(Self { by_entity })
    }

    /// Alias table for an entity. Entities without aliases get an empty table.
    pub fn for_entity(&self, entity_name: &str) -> EntityAliases {
        self.by_entity
            .get(entity_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, entity_name: &str) -> Option<&EntityAliases> {
        self.by_entity.get(entity_name)
    }
}
