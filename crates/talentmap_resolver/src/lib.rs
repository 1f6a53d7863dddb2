//! Field resolution: source columns onto target entity fields.
//!
//! Three matching layers with calibrated confidences sit behind one
//! entry point, [`FieldResolver::resolve`]. The embedding index is an
//! optional collaborator; without it the resolver runs degraded on the
//! deterministic and fuzzy stages and still succeeds.

pub mod classifier;
pub mod embedding;
pub mod resolver;

pub use classifier::{detect_entity, EntityCandidate};
pub use embedding::index::EmbeddingIndex;
pub use embedding::{EmbedError, HashEmbedder, TextEmbedder};
pub use resolver::FieldResolver;
