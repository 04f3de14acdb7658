//! Verification of a table after its columns were renamed to canonical
//! display names.

use log::info;
use serde::Serialize;

use crate::{data::parse_timestamp, fields::CanonicalField, parse::ParsedTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub success: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub record_count: usize,
}

pub fn verify_mapped_table(table: &ParsedTable, small_dataset_rows: usize) -> VerificationReport {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    let missing = CanonicalField::ALL
        .into_iter()
        .map(CanonicalField::display_name)
        .filter(|name| table.column_index(name).is_none())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        issues.push(format!("Missing required columns: {}", missing.join(", ")));
    }

    if let Some(idx) = table.column_index(CanonicalField::Timestamp.display_name()) {
        let invalid = count_invalid_timestamps(table, idx);
        if invalid > 0 {
            warnings.push(format!("{invalid} records have invalid timestamps"));
        }
    }

    for field in CanonicalField::ALL {
        let Some(idx) = table.column_index(field.display_name()) else {
            continue;
        };
        let empty = table.column_values(idx).filter(Option::is_none).count();
        if empty > 0 {
            warnings.push(format!("{empty} records have empty {} values", field.key()));
        }
    }

    let record_count = table.row_count();
    if record_count == 0 {
        issues.push("No data remaining after processing".to_string());
    } else if record_count < small_dataset_rows {
        warnings.push("Very small dataset - results may not be meaningful".to_string());
    }

    info!(
        "Verified mapped table: {record_count} record(s), {} issue(s), {} warning(s)",
        issues.len(),
        warnings.len()
    );
    VerificationReport {
        success: issues.is_empty(),
        issues,
        warnings,
        record_count,
    }
}

fn count_invalid_timestamps(table: &ParsedTable, idx: usize) -> usize {
    table
        .column_values(idx)
        .flatten()
        .filter(|value| parse_timestamp(value).is_none())
        .count()
}
