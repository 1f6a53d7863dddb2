//! Mapping application and artifact emission.
//!
//! The transformer applies a validated mapping set to a table, coerces
//! every cell to its target type, and emits CSV or XML into a staging
//! buffer that is only handed back on success. Row counts are taken
//! before transformation and re-counted from the emitted bytes; any
//! difference raises `DataLoss` and aborts the pipeline.

pub mod coerce;
pub mod csv_out;
pub mod xml_out;

use chrono::NaiveDateTime;

use talentmap_protocol::{
    CancellationToken, Config, DataLossReport, Mapping, OutputFormat, ParseMetadata,
    PipelineError, PipelineResult, Table,
};
use talentmap_schema::{EntitySchema, FieldDefinition};

use crate::validate::{check_mappings, validate};
use self::coerce::{coerce, default_cell, CellValue};

/// One output column: a target field plus where its values come from.
pub struct OutputColumn<'a> {
    pub field: &'a FieldDefinition,
    /// Index into the source table; None for unmapped required targets.
    pub source_index: Option<usize>,
    /// The source column was `||`-flagged during ingestion.
    pub pipe_flagged: bool,
}

/// Output projection: mapped targets in schema order, plus unmapped
/// required targets emitted from defaults (or empty).
pub struct OutputPlan<'a> {
    pub entity: &'a str,
    pub columns: Vec<OutputColumn<'a>>,
}

impl<'a> OutputPlan<'a> {
    pub fn build(
        table: &Table,
        schema: &'a EntitySchema,
        mappings: &[Mapping],
        metadata: &ParseMetadata,
    ) -> Self {
        let columns = schema
            .fields
            .iter()
            .filter_map(|field| {
                let mapping = mappings.iter().find(|m| m.target == field.name);
                match mapping {
                    Some(m) => {
                        let source_index = table.column_index(&m.source);
                        Some(OutputColumn {
                            field,
                            source_index,
                            pipe_flagged: metadata.is_multi_value(&m.source),
                        })
                    }
                    None if field.required => Some(OutputColumn {
                        field,
                        source_index: None,
                        pipe_flagged: false,
                    }),
                    None => None,
                }
            })
            .collect();
        Self {
            entity: &schema.name,
            columns,
        }
    }

    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.field.name.as_str()).collect()
    }

    /// Coerce one table row into output cells.
    pub fn build_row(&self, table: &Table, row_index: usize, now: &NaiveDateTime) -> Vec<CellValue> {
        let row = &table.rows[row_index];
        self.columns
            .iter()
            .map(|column| match column.source_index {
                Some(idx) => {
                    let raw = row.get(idx).map(String::as_str).unwrap_or("");
                    let outcome = coerce(raw, column.field, column.pipe_flagged);
                    if outcome.invalid_boolean {
                        tracing::warn!(
                            row = row_index,
                            field = %column.field.name,
                            "cell is not a recognized boolean literal; passed through"
                        );
                    }
                    outcome.value
                }
                None => default_cell(column.field, now),
            })
            .collect()
    }
}

/// Apply mappings and emit the requested artifact.
pub fn transform(
    table: &Table,
    schema: &EntitySchema,
    mappings: &[Mapping],
    metadata: &ParseMetadata,
    format: OutputFormat,
    config: &Config,
    cancel: &CancellationToken,
) -> PipelineResult<Vec<u8>> {
    check_mappings(table, schema, mappings)?;
    let report = validate(table, schema, mappings);
    if report.has_critical() {
        return Err(PipelineError::ValidationFailed { report });
    }

    let plan = OutputPlan::build(table, schema, mappings, metadata);
    let now = chrono::Utc::now().naive_utc();

    // Staging buffer: nothing escapes this function on failure.
    let emitted = match format {
        OutputFormat::Csv => csv_out::emit(&plan, table, &now, cancel)?,
        OutputFormat::Xml => {
            xml_out::emit(&plan, table, &now, config.stream_row_threshold, cancel)?
        }
    };

    verify_row_count(table, schema, mappings, &emitted, format)?;
    tracing::info!(
        entity = %schema.name,
        rows = table.row_count(),
        format = %format,
        bytes = emitted.len(),
        "transformation complete"
    );
    Ok(emitted)
}

/// Recount rows from the emitted artifact and fail loudly on loss.
/// Public so the count check can be exercised against doctored output.
pub fn verify_row_count(
    table: &Table,
    schema: &EntitySchema,
    mappings: &[Mapping],
    emitted: &[u8],
    format: OutputFormat,
) -> PipelineResult<()> {
    let input_rows = table.row_count();
    let output_rows = match format {
        OutputFormat::Csv => count_csv_records(emitted)?,
        OutputFormat::Xml => count_xml_records(emitted, &schema.name)?,
    };
    if output_rows == input_rows {
        return Ok(());
    }

    let mut report = DataLossReport::new(input_rows, output_rows)
        .with_samples((output_rows..input_rows).take(10).collect());
    for field in schema.required_fields() {
        if let Some(mapping) = mappings.iter().find(|m| m.target == field.name) {
            if let Some(idx) = table.column_index(&mapping.source) {
                let nulls = table
                    .column_values(idx)
                    .filter(|cell| cell.trim().is_empty())
                    .count();
                if nulls > 0 {
                    report = report.with_reason(format!(
                        "required target '{}' has {} empty source cell(s)",
                        field.name, nulls
                    ));
                }
            }
        }
    }
    report
        .transformations_applied
        .extend(mappings.iter().map(|m| format!("{} -> {}", m.source, m.target)));
    Err(PipelineError::DataLoss(report))
}

fn count_csv_records(emitted: &[u8]) -> PipelineResult<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(emitted);
    let mut count = 0usize;
    for record in reader.records() {
        record.map_err(|e| {
            PipelineError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        count += 1;
    }
    // First record is the header row.
    Ok(count.saturating_sub(1))
}

fn count_xml_records(emitted: &[u8], entity: &str) -> PipelineResult<usize> {
    let mut reader = quick_xml::Reader::from_reader(emitted);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut count = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                depth += 1;
                if depth == 2 && e.name().as_ref() == entity.as_bytes() {
                    count += 1;
                }
            }
            Ok(quick_xml::events::Event::Empty(e)) => {
                if depth == 1 && e.name().as_ref() == entity.as_bytes() {
                    count += 1;
                }
            }
            Ok(quick_xml::events::Event::End(_)) => {
                depth = depth.saturating_sub(1);
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(PipelineError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e,
                )))
            }
        }
        buf.clear();
    }
    Ok(count)
}
