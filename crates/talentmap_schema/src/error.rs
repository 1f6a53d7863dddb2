//! Schema and alias loading errors. All of these are configuration
//! errors: the process should refuse to start rather than run with a
//! broken dictionary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to parse schema resource '{source_name}': {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    #[error("Entity '{entity}' declares no fields")]
    NoFields { entity: String },

    #[error("Entity '{entity}' declares field '{field}' twice")]
    DuplicateField { entity: String, field: String },

    #[error("Alias table references unknown entity '{entity}'")]
    UnknownAliasEntity { entity: String },

    #[error("Alias table for '{entity}' references unknown target field '{target}'")]
    UnknownAliasTarget { entity: String, target: String },

    #[error("Alias '{alias}' in entity '{entity}' is ambiguous: claimed by both '{first}' and '{second}'")]
    DuplicateAlias {
        entity: String,
        alias: String,
        first: String,
        second: String,
    },
}
