//! XML artifact emission.
//!
//! Layout: `<{Entity}_List>` root, one `<{Entity}>` element per row,
//! list-typed fields as `<{field}_list><{field}>...</{field}></{field}_list>`,
//! two-space indent throughout. The writer streams event-by-event into
//! the staging buffer (no DOM), flushing the sink in fixed row batches;
//! batch boundaries never change the emitted bytes.

use std::io::Write;

use chrono::NaiveDateTime;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use talentmap_protocol::{CancellationToken, PipelineError, PipelineResult, Table};

use super::coerce::CellValue;
use super::OutputPlan;

/// Rows between explicit sink flushes on the streaming path.
const BATCH_ROWS: usize = 1000;

pub fn emit(
    plan: &OutputPlan<'_>,
    table: &Table,
    now: &NaiveDateTime,
    stream_row_threshold: usize,
    cancel: &CancellationToken,
) -> PipelineResult<Vec<u8>> {
    let streaming = table.row_count() > stream_row_threshold;
    let sink: Vec<u8> = Vec::new();
    let mut writer = Writer::new_with_indent(sink, b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;

    let root = format!("{}_List", plan.entity);
    writer
        .write_event(Event::Start(BytesStart::new(root.as_str())))
        .map_err(xml_error)?;

    for row_index in 0..table.row_count() {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        write_row(&mut writer, plan, table, row_index, now)?;
        if streaming && row_index % BATCH_ROWS == BATCH_ROWS - 1 {
            writer.get_mut().flush().map_err(PipelineError::Io)?;
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new(root.as_str())))
        .map_err(xml_error)?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_row(
    writer: &mut Writer<Vec<u8>>,
    plan: &OutputPlan<'_>,
    table: &Table,
    row_index: usize,
    now: &NaiveDateTime,
) -> PipelineResult<()> {
    writer
        .write_event(Event::Start(BytesStart::new(plan.entity)))
        .map_err(xml_error)?;

    let cells = plan.build_row(table, row_index, now);
    for (column, cell) in plan.columns.iter().zip(cells) {
        let name = column.field.xml_name();
        match cell {
            CellValue::Scalar(value) => write_scalar(writer, &name, &value)?,
            CellValue::List(parts) => {
                let list_name = format!("{}_list", name);
                if parts.is_empty() {
                    writer
                        .write_event(Event::Empty(BytesStart::new(list_name.as_str())))
                        .map_err(xml_error)?;
                } else {
                    writer
                        .write_event(Event::Start(BytesStart::new(list_name.as_str())))
                        .map_err(xml_error)?;
                    for part in &parts {
                        write_scalar(writer, &name, part)?;
                    }
                    writer
                        .write_event(Event::End(BytesEnd::new(list_name.as_str())))
                        .map_err(xml_error)?;
                }
            }
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new(plan.entity)))
        .map_err(xml_error)?;
    Ok(())
}

fn write_scalar(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> PipelineResult<()> {
    if value.is_empty() {
        writer
            .write_event(Event::Empty(BytesStart::new(name)))
            .map_err(xml_error)?;
        return Ok(());
    }
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)?;
    Ok(())
}

fn xml_error<E>(e: E) -> PipelineError
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}
