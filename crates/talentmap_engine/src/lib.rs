//! Ingestion, validation and transformation.
//!
//! The engine is the data path of the pipeline: bytes are tabulated by
//! [`ingest::ingest`], checked by [`validate::validate`], and projected
//! onto a target entity by [`transform::transform`]. Row-count
//! conservation is verified from the emitted artifact itself; the
//! engine never silently drops a row.

pub mod dates;
pub mod ingest;
pub mod transform;
pub mod validate;

pub use ingest::ingest;
pub use transform::{transform, verify_row_count};
pub use validate::{check_mappings, validate};
