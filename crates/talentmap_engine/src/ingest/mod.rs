//! Source ingestion: bytes in, normalized `Table` + `ParseMetadata` out.
//!
//! One pass per uploaded file: size gate, format detection, encoding
//! and delimiter sniffing for the CSV family, tabulation, multi-value
//! detection and advisory type sniffing. Any failure is a typed error;
//! success always carries metadata alongside the table.

pub mod delimiter;
pub mod encoding;
pub mod multivalue;
pub mod sniff;
pub mod spreadsheet;

use talentmap_protocol::{
    Config, ParseMetadata, PipelineError, PipelineResult, SourceFormat, Table,
};

const XLSX_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const XLS_MAGIC: [u8; 4] = [0xD0, 0xCF, 0x11, 0xE0];

/// Ingest an uploaded byte buffer.
pub fn ingest(
    bytes: &[u8],
    filename: &str,
    config: &Config,
) -> PipelineResult<(Table, ParseMetadata)> {
    if bytes.len() as u64 > config.max_upload_bytes {
        return Err(PipelineError::FileTooLarge {
            size: bytes.len() as u64,
            limit: config.max_upload_bytes,
        });
    }
    if bytes.is_empty() {
        return Err(PipelineError::InvalidFileFormat {
            filename: filename.to_string(),
            message: "file is empty".into(),
        });
    }

    let format = detect_format(bytes, filename)?;
    let (mut table, encoding_name, delimiter) = match format {
        SourceFormat::Xlsx | SourceFormat::Xls => {
            let table = spreadsheet::parse(bytes, filename, format)?;
            (table, "UTF-8".to_string(), None)
        }
        SourceFormat::Csv => {
            let (text, encoding_name) = encoding::decode(bytes)?;
            if text.trim().is_empty() {
                return Err(PipelineError::InvalidFileFormat {
                    filename: filename.to_string(),
                    message: "file contains no data".into(),
                });
            }
            let delimiter = delimiter::detect(&text)?;
            let table = tabulate(&text, delimiter, filename)?;
            (table, encoding_name, Some(delimiter))
        }
    };

    let multi_value_columns = multivalue::detect(&table);
    sniff::sniff_types(&mut table);

    let metadata = ParseMetadata {
        format,
        encoding: encoding_name,
        delimiter,
        row_count: table.row_count(),
        column_count: table.column_count(),
        multi_value_columns,
    };
    tracing::info!(
        filename,
        format = %metadata.format,
        encoding = %metadata.encoding,
        rows = metadata.row_count,
        columns = metadata.column_count,
        multi_value = metadata.multi_value_columns.len(),
        "ingested file"
    );
    Ok((table, metadata))
}

/// Classify the upload by extension and magic bytes. Spreadsheet
/// extensions must carry the matching magic; everything else goes down
/// the character-separated path.
fn detect_format(bytes: &[u8], filename: &str) -> PipelineResult<SourceFormat> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "xlsx" | "xlsm" => {
            if bytes.len() >= 4 && bytes[..4] == XLSX_MAGIC {
                Ok(SourceFormat::Xlsx)
            } else {
                Err(PipelineError::InvalidFileFormat {
                    filename: filename.to_string(),
                    message: "extension says XLSX but the content is not a ZIP archive".into(),
                })
            }
        }
        "xls" => {
            if bytes.len() >= 4 && bytes[..4] == XLS_MAGIC {
                Ok(SourceFormat::Xls)
            } else {
                Err(PipelineError::InvalidFileFormat {
                    filename: filename.to_string(),
                    message: "extension says XLS but the content is not an OLE document".into(),
                })
            }
        }
        _ => {
            // Spreadsheets are sometimes uploaded with a generic name.
            if bytes.len() >= 4 && bytes[..4] == XLSX_MAGIC {
                Ok(SourceFormat::Xlsx)
            } else if bytes.len() >= 4 && bytes[..4] == XLS_MAGIC {
                Ok(SourceFormat::Xls)
            } else {
                Ok(SourceFormat::Csv)
            }
        }
    }
}

/// Parse decoded text into a table with the detected delimiter.
/// Rows are padded to the header width; blank lines are skipped.
fn tabulate(text: &str, delimiter: char, filename: &str) -> PipelineResult<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(Ok(record)) => record,
        Some(Err(e)) => {
            return Err(PipelineError::DelimiterError {
                attempted: format!("'{}' ({e})", delimiter.escape_debug()),
            })
        }
        None => {
            return Err(PipelineError::InvalidFileFormat {
                filename: filename.to_string(),
                message: "file contains no rows".into(),
            })
        }
    };
    let columns: Vec<String> = header.iter().map(|c| c.trim().to_string()).collect();
    if columns.iter().all(|c| c.is_empty()) {
        return Err(PipelineError::InvalidFileFormat {
            filename: filename.to_string(),
            message: "header row is empty".into(),
        });
    }

    let mut rows = Vec::new();
    let mut ragged_rows = 0usize;
    for record in records {
        let record = record.map_err(|e| PipelineError::DelimiterError {
            attempted: format!("'{}' ({e})", delimiter.escape_debug()),
        })?;
        let mut cells: Vec<String> = record.iter().map(String::from).collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        if cells.len() > columns.len() {
            ragged_rows += 1;
            cells.truncate(columns.len());
        }
        cells.resize(columns.len(), String::new());
        rows.push(cells);
    }
    if ragged_rows > 0 {
        tracing::warn!(
            ragged_rows,
            "rows carried more fields than the header; extra fields dropped"
        );
    }

    Ok(Table::new(columns, rows))
}
