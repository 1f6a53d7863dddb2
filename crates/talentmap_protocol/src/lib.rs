//! Shared vocabulary of the TalentMap pipeline.
//!
//! Every crate in the workspace speaks these types: the ingestor produces
//! `Table` + `ParseMetadata`, the resolver produces `ResolutionReport`,
//! the validator produces `ValidationReport`, and the transformer either
//! emits bytes or raises a typed `PipelineError`.

pub mod cancel;
pub mod config;
pub mod error;
pub mod types;

pub use cancel::CancellationToken;
pub use config::Config;
pub use error::{DataLossReport, PipelineError, PipelineResult};
pub use types::{
    AffectedRows,
    Alternative,
    EntityDetection,
    FileId,
    IssueKind,
    Mapping,
    MatchMethod,
    MultiValueColumn,
    OutputFormat,
    ParseMetadata,
    ResolutionReport,
    SemanticType,
    Severity,
    SourceFormat,
    Table,
    ValidationIssue,
    ValidationReport,
};
