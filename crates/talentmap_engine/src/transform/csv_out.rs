//! CSV artifact emission. RFC 4180 quoting via the csv crate; list
//! values collapse back to `||`-joined strings. Output is built in a
//! staging buffer and returned only when every row has been written.

use chrono::NaiveDateTime;

use talentmap_protocol::{CancellationToken, PipelineError, PipelineResult, Table};

use super::OutputPlan;

pub fn emit(
    plan: &OutputPlan<'_>,
    table: &Table,
    now: &NaiveDateTime,
    cancel: &CancellationToken,
) -> PipelineResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(plan.header()).map_err(csv_error)?;

    for row_index in 0..table.row_count() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let cells = plan.build_row(table, row_index, now);
        let record: Vec<String> = cells.iter().map(|c| c.to_flat_string()).collect();
        writer.write_record(&record).map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))
}

fn csv_error(e: csv::Error) -> PipelineError {
    PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}
