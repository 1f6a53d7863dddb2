//! Multi-value cell detection.
//!
//! The double-pipe separator is the authoritative list convention in
//! the upstream exports. A column where more than 5% of sampled
//! non-empty cells contain `||` is flagged multi-valued; comma fallback
//! splitting is a transformer decision, never flagged here.

use talentmap_protocol::{MultiValueColumn, Table};

pub const LIST_SEPARATOR: &str = "||";

const SAMPLE_CELLS: usize = 200;
const FLAG_THRESHOLD: f64 = 0.05;
const MAX_SAMPLE_VALUES: usize = 3;

pub fn detect(table: &Table) -> Vec<MultiValueColumn> {
    let mut flagged = Vec::new();
    for (idx, column) in table.columns.iter().enumerate() {
        let mut non_empty = 0usize;
        let mut with_separator = 0usize;
        let mut samples = Vec::new();
        for cell in table.column_values(idx).take(SAMPLE_CELLS) {
            if cell.is_empty() {
                continue;
            }
            non_empty += 1;
            if cell.contains(LIST_SEPARATOR) {
                with_separator += 1;
                if samples.len() < MAX_SAMPLE_VALUES {
                    samples.push(cell.to_string());
                }
            }
        }
        if non_empty == 0 {
            continue;
        }
        let share = with_separator as f64 / non_empty as f64;
        if share > FLAG_THRESHOLD {
            flagged.push(MultiValueColumn {
                column: column.clone(),
                separator: LIST_SEPARATOR.to_string(),
                sample_values: samples,
            });
        }
    }
    flagged
}
