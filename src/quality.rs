//! Data-quality analysis over a parsed table.
//!
//! Every statistic is computed column by column over the in-memory grid and the
//! whole report is rebuilt on each call. Missing cells are exactly the `None`
//! cells of the table, so the per-column counts agree with a plain scan.

use std::collections::HashSet;

use log::{debug, info};
use serde::{Serialize, Serializer};

use crate::{
    config::QualitySettings,
    data::{header_tokens, normalize_header, parse_number},
    metadata::{ColumnKind, infer_column_kind},
    parse::{ParsedTable, Row},
};

const KEY_COLUMN_NAMES: &[&str] = &["id", "userid", "doorid"];
const IQR_MULTIPLIER: f64 = 1.5;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// Rough per-cell footprints of a columnar in-memory frame.
const INDEX_BYTES: usize = 128;
const FIXED_WIDTH_CELL_BYTES: usize = 8;
const BOOLEAN_CELL_BYTES: usize = 1;
const TEXT_POINTER_BYTES: usize = 8;
const TEXT_OBJECT_OVERHEAD: usize = 49;
const MISSING_OBJECT_BYTES: usize = 24;

/// Per-column values in header order, serialized as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap<T>(Vec<(String, T)>);

impl<T> ColumnMap<T> {
    pub fn get(&self, column: &str) -> Option<&T> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> + '_ {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for ColumnMap<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> FromIterator<(String, T)> for ColumnMap<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Serialize> Serialize for ColumnMap<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.0.iter().map(|(name, value)| (name, value)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicStats {
    pub rows: usize,
    pub columns: usize,
    pub memory_usage_mb: f64,
    pub numeric_columns: usize,
    pub text_columns: usize,
    pub datetime_columns: usize,
    pub boolean_columns: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingStats {
    pub missing_count: usize,
    pub missing_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSuggestion {
    pub current_type: ColumnKind,
    pub unique_values: usize,
    pub should_be_categorical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateStats {
    pub total_duplicate_rows: usize,
    pub duplicate_percentage: f64,
    pub key_column_duplicates: ColumnMap<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierStats {
    pub q1: f64,
    pub q3: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub outlier_count: usize,
    pub outlier_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub basic_stats: BasicStats,
    pub missing_by_column: ColumnMap<MissingStats>,
    pub total_missing_cells: usize,
    pub total_missing_percentage: f64,
    pub duplicate_stats: DuplicateStats,
    pub type_suggestions: ColumnMap<TypeSuggestion>,
    pub outlier_stats: ColumnMap<OutlierStats>,
    pub recommendations: Vec<String>,
}

/// Either a full report or a single flag for an empty table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QualityAnalysis {
    Report(Box<QualityReport>),
    Empty { error: String },
}

impl QualityAnalysis {
    pub fn report(&self) -> Option<&QualityReport> {
        match self {
            QualityAnalysis::Report(report) => Some(report),
            QualityAnalysis::Empty { .. } => None,
        }
    }
}

/// Column facts gathered in one pass per column.
struct ColumnProfile {
    name: String,
    kind: ColumnKind,
    missing: usize,
    unique: usize,
    bytes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DataQualityAnalyzer {
    settings: QualitySettings,
}

impl DataQualityAnalyzer {
    pub fn new(settings: QualitySettings) -> Self {
        Self { settings }
    }

    pub fn analyze(&self, table: &ParsedTable) -> QualityAnalysis {
        if table.is_empty() {
            info!("Quality analysis skipped: table is empty");
            return QualityAnalysis::Empty {
                error: "Table is empty".to_string(),
            };
        }
        let rows = table.row_count();
        let profiles = (0..table.column_count())
            .map(|idx| profile_column(table, idx))
            .collect::<Vec<_>>();

        let basic_stats = basic_stats(table, &profiles);

        let missing_by_column = profiles
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    MissingStats {
                        missing_count: p.missing,
                        missing_percentage: percentage(p.missing, rows),
                    },
                )
            })
            .collect::<ColumnMap<_>>();
        let total_missing_cells = profiles.iter().map(|p| p.missing).sum::<usize>();
        let total_missing_percentage = percentage(total_missing_cells, rows * profiles.len());

        let type_suggestions = profiles
            .iter()
            .map(|p| {
                let should_be_categorical = p.kind == ColumnKind::Text
                    && (p.unique as f64) < rows as f64 * self.settings.categorical_ratio
                    && p.unique < self.settings.categorical_max_unique;
                (
                    p.name.clone(),
                    TypeSuggestion {
                        current_type: p.kind,
                        unique_values: p.unique,
                        should_be_categorical,
                    },
                )
            })
            .collect::<ColumnMap<_>>();

        let duplicate_stats = duplicate_stats(table);

        let outlier_stats = profiles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind.is_numeric())
            .filter_map(|(idx, p)| {
                let values = table
                    .column_values(idx)
                    .flatten()
                    .filter_map(parse_number)
                    .collect::<Vec<_>>();
                outlier_fence(values, rows).map(|stats| (p.name.clone(), stats))
            })
            .collect::<ColumnMap<_>>();

        let mut report = QualityReport {
            basic_stats,
            missing_by_column,
            total_missing_cells,
            total_missing_percentage,
            duplicate_stats,
            type_suggestions,
            outlier_stats,
            recommendations: Vec::new(),
        };
        report.recommendations = self.recommendations(&report);
        info!(
            "Quality analysis: {rows} row(s), {} missing cell(s), {} duplicate row(s), {} recommendation(s)",
            report.total_missing_cells,
            report.duplicate_stats.total_duplicate_rows,
            report.recommendations.len()
        );
        QualityAnalysis::Report(Box::new(report))
    }

    fn recommendations(&self, report: &QualityReport) -> Vec<String> {
        let mut recommendations = Vec::new();

        let high_missing = report
            .missing_by_column
            .iter()
            .filter(|(_, s)| s.missing_percentage > self.settings.missing_drop_percentage)
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        if !high_missing.is_empty() {
            recommendations.push(format!(
                "Consider removing columns with high missing data: {}",
                high_missing.join(", ")
            ));
        }

        let duplicates = &report.duplicate_stats;
        if duplicates.duplicate_percentage > self.settings.duplicate_percentage {
            recommendations.push(format!(
                "Remove {} duplicate rows ({:.1}%)",
                duplicates.total_duplicate_rows, duplicates.duplicate_percentage
            ));
        }

        let categorical = report
            .type_suggestions
            .iter()
            .filter(|(_, s)| s.should_be_categorical)
            .map(|(name, _)| name)
            .collect::<Vec<_>>();
        if !categorical.is_empty() {
            recommendations.push(format!(
                "Convert to categorical for memory efficiency: {}",
                categorical.join(", ")
            ));
        }

        let memory_mb = report.basic_stats.memory_usage_mb;
        if memory_mb > self.settings.memory_warning_mb {
            recommendations.push(format!(
                "Large dataset ({memory_mb:.1}MB) - consider processing in chunks"
            ));
        }
        recommendations
    }
}

fn profile_column(table: &ParsedTable, idx: usize) -> ColumnProfile {
    let kind = infer_column_kind(table.column_values(idx));
    let mut missing = 0;
    let mut bytes = 0;
    let mut distinct_text = HashSet::new();
    let mut distinct_numbers = HashSet::new();
    for value in table.column_values(idx) {
        bytes += cell_bytes(kind, value);
        match value {
            None => missing += 1,
            Some(raw) if kind.is_numeric() => {
                if let Some(number) = parse_number(raw) {
                    // Fold -0.0 into 0.0 so both count once.
                    distinct_numbers.insert((number + 0.0).to_bits());
                }
            }
            Some(raw) => {
                distinct_text.insert(raw);
            }
        }
    }
    ColumnProfile {
        name: table.headers()[idx].clone(),
        kind,
        missing,
        unique: distinct_text.len() + distinct_numbers.len(),
        bytes,
    }
}

fn cell_bytes(kind: ColumnKind, value: Option<&str>) -> usize {
    match (kind, value) {
        (ColumnKind::Integer | ColumnKind::Float | ColumnKind::DateTime, _) => {
            FIXED_WIDTH_CELL_BYTES
        }
        (ColumnKind::Boolean, _) => BOOLEAN_CELL_BYTES,
        (ColumnKind::Text, Some(raw)) => TEXT_POINTER_BYTES + TEXT_OBJECT_OVERHEAD + raw.len(),
        (ColumnKind::Text, None) => TEXT_POINTER_BYTES + MISSING_OBJECT_BYTES,
    }
}

fn basic_stats(table: &ParsedTable, profiles: &[ColumnProfile]) -> BasicStats {
    let count = |pred: fn(ColumnKind) -> bool| profiles.iter().filter(|p| pred(p.kind)).count();
    let bytes = INDEX_BYTES + profiles.iter().map(|p| p.bytes).sum::<usize>();
    BasicStats {
        rows: table.row_count(),
        columns: table.column_count(),
        memory_usage_mb: bytes as f64 / BYTES_PER_MB,
        numeric_columns: count(ColumnKind::is_numeric),
        text_columns: count(|k| k == ColumnKind::Text),
        datetime_columns: count(|k| k == ColumnKind::DateTime),
        boolean_columns: count(|k| k == ColumnKind::Boolean),
    }
}

/// Whole-row duplicates after the first occurrence, plus per-column repeats
/// for identifier-like columns. Missing cells compare equal to each other.
fn duplicate_stats(table: &ParsedTable) -> DuplicateStats {
    let rows = table.row_count();
    let mut seen: HashSet<&Row> = HashSet::with_capacity(rows);
    let total_duplicate_rows = table.rows().iter().filter(|row| !seen.insert(*row)).count();

    let key_column_duplicates = table
        .headers()
        .iter()
        .enumerate()
        .filter(|(_, name)| is_identifier_column(name))
        .map(|(idx, name)| {
            let mut seen = HashSet::new();
            let repeats = table.column_values(idx).filter(|v| !seen.insert(*v)).count();
            (name.clone(), repeats)
        })
        .collect::<ColumnMap<_>>();
    debug!(
        "{total_duplicate_rows} duplicate row(s); {} identifier column(s) checked",
        key_column_duplicates.len()
    );

    DuplicateStats {
        total_duplicate_rows,
        duplicate_percentage: percentage(total_duplicate_rows, rows),
        key_column_duplicates,
    }
}

pub fn is_identifier_column(name: &str) -> bool {
    let normalized = normalize_header(name);
    KEY_COLUMN_NAMES.contains(&normalized.as_str())
        || header_tokens(name).iter().any(|token| token == "id")
}

/// Linear-interpolation quantile of sorted values, `q` in `[0, 1]`.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = (sorted.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// IQR fence over the non-missing values; the percentage is over all rows.
pub fn outlier_fence(mut values: Vec<f64>, total_rows: usize) -> Option<OutlierStats> {
    values.sort_by(f64::total_cmp);
    let q1 = quantile(&values, 0.25)?;
    let q3 = quantile(&values, 0.75)?;
    let iqr = q3 - q1;
    let lower_bound = q1 - IQR_MULTIPLIER * iqr;
    let upper_bound = q3 + IQR_MULTIPLIER * iqr;
    let outlier_count = values
        .iter()
        .filter(|v| **v < lower_bound || **v > upper_bound)
        .count();
    Some(OutlierStats {
        q1,
        q3,
        lower_bound,
        upper_bound,
        outlier_count,
        outlier_percentage: percentage(outlier_count, total_rows),
    })
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
