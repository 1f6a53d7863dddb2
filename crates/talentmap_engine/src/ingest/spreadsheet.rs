//! XLSX/XLS ingestion: first worksheet only, no encoding or delimiter
//! step. Cell values are stringified; Excel serial dates become
//! ISO-8601 so the downstream coercion path sees one vocabulary.

use std::io::Cursor;

use calamine::{Data, Range, Reader, Xls, Xlsx};
use talentmap_protocol::{PipelineError, PipelineResult, SourceFormat, Table};

pub fn parse(bytes: &[u8], filename: &str, format: SourceFormat) -> PipelineResult<Table> {
    let range = match format {
        SourceFormat::Xlsx => first_sheet_xlsx(bytes, filename)?,
        SourceFormat::Xls => first_sheet_xls(bytes, filename)?,
        SourceFormat::Csv => {
            return Err(PipelineError::InvalidFileFormat {
                filename: filename.to_string(),
                message: "not a spreadsheet".into(),
            })
        }
    };

    let mut rows_iter = range.rows();
    let Some(header_row) = rows_iter.next() else {
        return Err(PipelineError::InvalidFileFormat {
            filename: filename.to_string(),
            message: "first worksheet is empty".into(),
        });
    };
    let columns: Vec<String> = header_row.iter().map(cell_to_string).collect();
    if columns.iter().all(|c| c.trim().is_empty()) {
        return Err(PipelineError::InvalidFileFormat {
            filename: filename.to_string(),
            message: "first worksheet has no header row".into(),
        });
    }

    let mut rows = Vec::new();
    for row in rows_iter {
        let mut cells: Vec<String> = row.iter().map(cell_to_string).collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        cells.resize(columns.len(), String::new());
        rows.push(cells);
    }

    Ok(Table::new(columns, rows))
}

fn first_sheet_xlsx(bytes: &[u8], filename: &str) -> PipelineResult<Range<Data>> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes.to_vec())).map_err(|e| PipelineError::InvalidFileFormat {
            filename: filename.to_string(),
            message: format!("not a readable XLSX workbook: {e}"),
        })?;
    workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::InvalidFileFormat {
            filename: filename.to_string(),
            message: "workbook contains no worksheets".into(),
        })?
        .map_err(|e| PipelineError::InvalidFileFormat {
            filename: filename.to_string(),
            message: format!("failed to read first worksheet: {e}"),
        })
}

fn first_sheet_xls(bytes: &[u8], filename: &str) -> PipelineResult<Range<Data>> {
    let mut workbook: Xls<_> =
        Xls::new(Cursor::new(bytes.to_vec())).map_err(|e| PipelineError::InvalidFileFormat {
            filename: filename.to_string(),
            message: format!("not a readable XLS workbook: {e}"),
        })?;
    workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::InvalidFileFormat {
            filename: filename.to_string(),
            message: "workbook contains no worksheets".into(),
        })?
        .map_err(|e| PipelineError::InvalidFileFormat {
            filename: filename.to_string(),
            message: format!("failed to read first worksheet: {e}"),
        })
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => {
                if naive.time() == chrono::NaiveTime::MIN {
                    naive.format("%Y-%m-%d").to_string()
                } else {
                    naive.format("%Y-%m-%dT%H:%M:%S").to_string()
                }
            }
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => {
            tracing::debug!(?e, "spreadsheet cell carries an error value");
            String::new()
        }
    }
}
