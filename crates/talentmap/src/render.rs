//! Terminal rendering of pipeline reports.

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Table as DisplayTable};
use talentmap_protocol::{
    EntityDetection, ParseMetadata, ResolutionReport, Severity, ValidationReport,
};

pub fn render_metadata(metadata: &ParseMetadata) -> String {
    let mut table = DisplayTable::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Property", "Value"]);
    table.add_row(vec!["Format".to_string(), metadata.format.to_string()]);
    table.add_row(vec!["Encoding".to_string(), metadata.encoding.clone()]);
    table.add_row(vec![
        "Delimiter".to_string(),
        metadata
            .delimiter
            .map(|d| format!("'{}'", d.escape_debug()))
            .unwrap_or_else(|| "-".to_string()),
    ]);
    table.add_row(vec!["Rows".to_string(), metadata.row_count.to_string()]);
    table.add_row(vec!["Columns".to_string(), metadata.column_count.to_string()]);
    table.add_row(vec![
        "Multi-value columns".to_string(),
        if metadata.multi_value_columns.is_empty() {
            "-".to_string()
        } else {
            metadata
                .multi_value_columns
                .iter()
                .map(|m| m.column.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        },
    ]);
    table.to_string()
}

pub fn render_resolution(report: &ResolutionReport) -> String {
    let mut out = String::new();
    let mut table = DisplayTable::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Source column", "Target field", "Confidence", "Method"]);
    for mapping in &report.mappings {
        table.add_row(vec![
            Cell::new(&mapping.source),
            Cell::new(&mapping.target),
            Cell::new(format!("{:.2}", mapping.confidence)),
            Cell::new(mapping.method.to_string()),
        ]);
    }
    out.push_str(&table.to_string());
    out.push('\n');
    out.push_str(&format!(
        "Mapped {:.1}% of source columns onto {}\n",
        report.mapping_percentage, report.entity
    ));
    if !report.unmapped_sources.is_empty() {
        out.push_str(&format!(
            "Unmapped source columns: {}\n",
            report.unmapped_sources.join(", ")
        ));
    }
    if !report.unmapped_targets.is_empty() {
        out.push_str(&format!(
            "Unclaimed target fields: {}\n",
            report.unmapped_targets.join(", ")
        ));
    }
    for diagnostic in &report.diagnostics {
        out.push_str(&format!("note: {}\n", diagnostic));
    }
    out
}

pub fn render_detection(detection: &EntityDetection) -> String {
    let mut table = DisplayTable::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Entity", "Score"]);
    for (entity, score) in &detection.all_scores {
        table.add_row(vec![entity.clone(), format!("{:.3}", score)]);
    }
    format!(
        "Detected entity: {} (confidence {:.3})\n{}",
        detection.entity, detection.confidence, table
    )
}

pub fn render_validation(report: &ValidationReport) -> String {
    if report.issues.is_empty() {
        return "No issues found; file is valid.\n".to_string();
    }
    let mut table = DisplayTable::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Severity", "Kind", "Field", "Description", "Suggestion"]);
    for issue in &report.issues {
        table.add_row(vec![
            Cell::new(issue.severity.to_string()),
            Cell::new(format!("{:?}", issue.kind)),
            Cell::new(&issue.field),
            Cell::new(&issue.description),
            Cell::new(issue.suggestion.as_deref().unwrap_or("-")),
        ]);
    }
    let verdict = if report.is_valid {
        "File is valid (warnings do not block transformation)."
    } else {
        "File is NOT valid: critical issues must be fixed first."
    };
    let criticals = report
        .issues
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .count();
    format!(
        "{}\n{} issue(s), {} critical.\n{}\n",
        table,
        report.issues.len(),
        criticals,
        verdict
    )
}
