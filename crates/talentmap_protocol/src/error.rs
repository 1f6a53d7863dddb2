//! Typed error taxonomy for the pipeline.
//!
//! Every kind carries an actionable display string. Critical errors are
//! surfaced to the caller unchanged; the core never swallows one to
//! succeed partially.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ValidationReport;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("File is too large: {size} bytes (limit {limit} bytes). Split the export or raise TALENTMAP_MAX_UPLOAD_BYTES.")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Unrecognized file format for '{filename}': {message}")]
    InvalidFileFormat { filename: String, message: String },

    #[error("Could not decode file contents: {message}. Re-export the file as UTF-8.")]
    EncodingError { message: String },

    #[error("Delimiter detection failed. Attempted: {attempted}. Try: pipe, tab, semicolon.")]
    DelimiterError { attempted: String },

    #[error("File not found: {file_id}. It may have expired; re-upload and retry.")]
    FileNotFound { file_id: String },

    #[error("Unknown target entity: '{entity}'. Known entities: {known}")]
    SchemaNotFound { entity: String, known: String },

    #[error("Embedding index unavailable: {message}")]
    EmbeddingIndexUnavailable { message: String },

    #[error("Mappings are invalid: {message}")]
    InvalidMappings { message: String },

    #[error("Validation reported critical issues; transformation refused")]
    ValidationFailed { report: ValidationReport },

    #[error("{0}")]
    DataLoss(DataLossReport),

    #[error("{operation} took {elapsed_secs:.1}s, over the {limit_secs}s budget")]
    Timeout {
        operation: String,
        limit_secs: u64,
        elapsed_secs: f64,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// True for kinds that must abort the pipeline.
    pub fn is_critical(&self) -> bool {
        !matches!(self, PipelineError::EmbeddingIndexUnavailable { .. })
    }
}

/// Diagnostics attached to a DATA_LOSS_DETECTED failure.
///
/// Row counts are taken before transformation and after artifact emission;
/// any difference is fatal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataLossReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub lost_rows: usize,
    pub loss_percentage: f64,
    /// Up to ten indices of rows missing from the output.
    pub sample_row_indices: Vec<usize>,
    /// Suspected causes (null counts per required target, duplicate keys, ...).
    pub reasons: Vec<String>,
    /// Transformations that ran before the loss was detected.
    pub transformations_applied: Vec<String>,
}

impl DataLossReport {
    pub fn new(input_rows: usize, output_rows: usize) -> Self {
        let lost_rows = input_rows.saturating_sub(output_rows);
        let loss_percentage = if input_rows > 0 {
            (lost_rows as f64 / input_rows as f64) * 100.0
        } else {
            0.0
        };
        Self {
            input_rows,
            output_rows,
            lost_rows,
            loss_percentage,
            sample_row_indices: Vec::new(),
            reasons: Vec::new(),
            transformations_applied: Vec::new(),
        }
    }

    pub fn with_samples(mut self, indices: Vec<usize>) -> Self {
        self.sample_row_indices = indices;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reasons.push(reason.into());
        self
    }
}

impl std::fmt::Display for DataLossReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Data loss detected: {} of {} rows missing from output ({:.1}% loss)",
            self.lost_rows, self.input_rows, self.loss_percentage
        )?;
        if !self.sample_row_indices.is_empty() {
            write!(f, "; sample missing rows: {:?}", self.sample_row_indices)?;
        }
        if !self.reasons.is_empty() {
            write!(f, "; suspected causes: {}", self.reasons.join(", "))?;
        }
        Ok(())
    }
}
