//! TalentMap: heterogeneous HR exports onto a fixed target schema.
//!
//! The [`Pipeline`] facade is the programmatic surface: ingest a file,
//! detect its entity, auto-map its columns, validate, transform. The
//! CLI in `main.rs` is a thin driver over the same five operations.

pub mod facade;
pub mod render;

pub use facade::Pipeline;
