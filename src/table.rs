use std::{borrow::Cow, fmt::Write as _};

use crate::{
    fuzzy::CacheStats,
    mapping::SuggestedMapping,
    quality::QualityReport,
};

/// Left-aligned plain-text table with a dashed separator under the header.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(sanitize_cell(cell).chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths
        .iter()
        .map(|w| "-".repeat((*w).max(3)))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn render_suggestions(suggestions: &SuggestedMapping) -> String {
    let headers = ["header", "field", "display name", "score", "confidence"]
        .map(String::from)
        .to_vec();
    let rows = suggestions
        .iter()
        .map(|(header, s)| {
            vec![
                header.to_string(),
                s.field.key().to_string(),
                s.field.display_name().to_string(),
                format!("{:.3}", s.confidence_score),
                s.confidence_bucket.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

pub fn render_missing_summary(report: &QualityReport) -> String {
    let headers = ["column", "type", "missing", "missing %", "unique"]
        .map(String::from)
        .to_vec();
    let rows = report
        .missing_by_column
        .iter()
        .map(|(column, missing)| {
            let suggestion = report.type_suggestions.get(column);
            vec![
                column.to_string(),
                suggestion
                    .map(|s| s.current_type.as_str().to_string())
                    .unwrap_or_default(),
                missing.missing_count.to_string(),
                format!("{:.1}", missing.missing_percentage),
                suggestion
                    .map(|s| s.unique_values.to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&headers, &rows)
}

pub fn render_cache_stats(stats: &CacheStats) -> String {
    format!(
        "match cache: {} hit(s), {} miss(es), {}/{} entries",
        stats.hits, stats.misses, stats.len, stats.capacity
    )
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{:<width$}", sanitize_cell(value)))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
