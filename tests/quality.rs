use access_ingest::{
    config::QualitySettings,
    parse::{ParsedTable, Row},
    quality::{DataQualityAnalyzer, QualityAnalysis, outlier_fence, quantile},
};
use proptest::prelude::*;

const COLUMNS: usize = 50;
const ROWS: usize = 10_000;

/// Deterministic xorshift so the large fixture is reproducible without a
/// random crate.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }
}

fn synthetic_table(columns: usize, rows: usize, null_per_mille: u64) -> ParsedTable {
    let mut rng = Lcg(0x9E37_79B9_7F4A_7C15);
    let headers = (0..columns).map(|c| format!("col_{c}")).collect::<Vec<_>>();
    let rows = (0..rows)
        .map(|r| {
            (0..columns)
                .map(|c| {
                    if rng.next() % 1000 < null_per_mille {
                        None
                    } else {
                        Some(format!("{}", (r * 31 + c * 7) % 997))
                    }
                })
                .collect::<Row>()
        })
        .collect::<Vec<_>>();
    ParsedTable::new(headers, rows).expect("valid synthetic table")
}

fn naive_missing(table: &ParsedTable, column: usize) -> usize {
    let mut count = 0;
    for row in table.rows() {
        if row[column].is_none() {
            count += 1;
        }
    }
    count
}

#[test]
fn missing_counts_match_naive_scan_on_large_table() {
    let table = synthetic_table(COLUMNS, ROWS, 100);
    let analysis = DataQualityAnalyzer::default().analyze(&table);
    let report = analysis.report().expect("non-empty table");

    assert_eq!(report.basic_stats.rows, ROWS);
    assert_eq!(report.basic_stats.columns, COLUMNS);
    assert_eq!(report.missing_by_column.len(), COLUMNS);

    let mut total = 0;
    for (idx, header) in table.headers().iter().enumerate() {
        let expected = naive_missing(&table, idx);
        let stats = report.missing_by_column.get(header).expect("column reported");
        assert_eq!(stats.missing_count, expected, "column {header}");
        let expected_pct = expected as f64 / ROWS as f64 * 100.0;
        assert!((stats.missing_percentage - expected_pct).abs() < 1e-9);
        total += expected;
    }
    assert_eq!(report.total_missing_cells, total);
    let expected_total_pct = total as f64 / (ROWS * COLUMNS) as f64 * 100.0;
    assert!((report.total_missing_percentage - expected_total_pct).abs() < 1e-9);
    assert!(report.total_missing_percentage > 5.0 && report.total_missing_percentage < 15.0);
}

#[test]
fn empty_table_reports_single_error() {
    let table = ParsedTable::new(vec!["a".to_string()], Vec::new()).unwrap();
    let analysis = DataQualityAnalyzer::default().analyze(&table);
    assert_eq!(
        analysis,
        QualityAnalysis::Empty {
            error: "Table is empty".to_string()
        }
    );
    let json = serde_json::to_value(&analysis).unwrap();
    assert_eq!(json, serde_json::json!({"error": "Table is empty"}));
}

#[test]
fn iqr_fence_flags_the_extreme_value() {
    let mut values = (1..=10).map(f64::from).collect::<Vec<_>>();
    values.push(100.0);
    let stats = outlier_fence(values, 11).expect("values present");
    assert_eq!(stats.q1, 3.5);
    assert_eq!(stats.q3, 8.5);
    assert_eq!(stats.lower_bound, -4.0);
    assert_eq!(stats.upper_bound, 16.0);
    assert_eq!(stats.outlier_count, 1);
    assert!((stats.outlier_percentage - 100.0 / 11.0).abs() < 1e-9);
}

#[test]
fn outliers_reported_through_analyzer() {
    let mut rows = (1..=10)
        .map(|v| vec![Some(v.to_string())])
        .collect::<Vec<Row>>();
    rows.push(vec![Some("100".to_string())]);
    let table = ParsedTable::new(vec!["reading".to_string()], rows).unwrap();
    let analysis = DataQualityAnalyzer::default().analyze(&table);
    let report = analysis.report().unwrap();
    let stats = report.outlier_stats.get("reading").expect("numeric column");
    assert_eq!(stats.outlier_count, 1);
    assert_eq!(report.basic_stats.numeric_columns, 1);
}

#[test]
fn duplicate_rows_trigger_recommendation() {
    let mut rows = vec![vec![Some("a".to_string()), Some("1".to_string())]; 5];
    rows.push(vec![Some("b".to_string()), Some("2".to_string())]);
    let table = ParsedTable::new(vec!["name".to_string(), "n".to_string()], rows).unwrap();
    let analysis = DataQualityAnalyzer::new(QualitySettings::default()).analyze(&table);
    let report = analysis.report().unwrap();
    assert_eq!(report.duplicate_stats.total_duplicate_rows, 4);
    assert!(
        report
            .recommendations
            .iter()
            .any(|r| r.contains("duplicate")),
        "{:?}",
        report.recommendations
    );
}

#[test]
fn quantile_interpolates_linearly() {
    assert_eq!(quantile(&[], 0.5), None);
    assert_eq!(quantile(&[4.0], 0.25), Some(4.0));
    assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.5), Some(2.5));
}

fn table_strategy() -> impl Strategy<Value = ParsedTable> {
    (1usize..6, 1usize..40).prop_flat_map(|(columns, rows)| {
        proptest::collection::vec(
            proptest::collection::vec(proptest::option::of("[a-z0-9]{1,4}"), columns),
            rows,
        )
        .prop_map(move |rows| {
            let headers = (0..columns).map(|c| format!("c{c}")).collect();
            ParsedTable::new(headers, rows).expect("uniform rows")
        })
    })
}

proptest! {
    #[test]
    fn missing_totals_equal_column_sum(table in table_strategy()) {
        let analysis = DataQualityAnalyzer::default().analyze(&table);
        let report = analysis.report().expect("rows present");
        let per_column = report
            .missing_by_column
            .iter()
            .map(|(_, stats)| stats.missing_count)
            .sum::<usize>();
        prop_assert_eq!(report.total_missing_cells, per_column);
        for (idx, header) in table.headers().iter().enumerate() {
            let stats = report.missing_by_column.get(header).expect("column reported");
            prop_assert_eq!(stats.missing_count, naive_missing(&table, idx));
        }
    }
}
