//! Rectangularization of heterogeneous rows into primitive cells.

use crate::conf::{C_TRUNCATION_SUFFIX, N_LEN_CELL_TEXT_MAX};
use crate::spec::{EnumCellValue, EnumRawCell, SpecTable};
use crate::timeval::grid_date_from_datetime;

/// Text used for non-finite numbers, which hosts cannot store as numbers.
pub fn convert_nan_inf_to_str(x: f64) -> Option<&'static str> {
    if x.is_nan() {
        return Some("NaN");
    }
    if x.is_infinite() {
        return Some(if x.is_sign_positive() { "Inf" } else { "-Inf" });
    }
    None
}

/// Clip text to the host cell ceiling, ending with a visible marker.
///
/// Output of a clipped string is exactly `N_LEN_CELL_TEXT_MAX` characters, so
/// clipping is idempotent.
pub fn truncate_cell_text(text: &str) -> String {
    if text.chars().count() <= N_LEN_CELL_TEXT_MAX {
        return text.to_string();
    }
    let n_keep = N_LEN_CELL_TEXT_MAX - C_TRUNCATION_SUFFIX.chars().count();
    let mut c_text: String = text.chars().take(n_keep).collect();
    c_text.push_str(C_TRUNCATION_SUFFIX);
    c_text
}

/// Convert one raw cell to a primitive cell.
pub fn normalize_cell(value: &EnumRawCell) -> EnumCellValue {
    match value {
        EnumRawCell::Null => EnumCellValue::empty(),
        EnumRawCell::Boolean(b) => EnumCellValue::Boolean(*b),
        EnumRawCell::Number(n) => match convert_nan_inf_to_str(*n) {
            Some(c_text) => EnumCellValue::from(c_text),
            None => EnumCellValue::Number(*n),
        },
        EnumRawCell::String(s) => EnumCellValue::String(truncate_cell_text(s)),
        EnumRawCell::DateTime(dt) => EnumCellValue::from(grid_date_from_datetime(dt)),
        EnumRawCell::Json(v) => EnumCellValue::String(truncate_cell_text(&v.to_string())),
    }
}

/// Caller-side width rule: `max(header width, widest row)`.
pub fn calculate_target_cols<T>(headers: &[String], rows: &[Vec<T>]) -> usize {
    rows.iter()
        .map(Vec::len)
        .fold(headers.len(), usize::max)
}

/// Normalize every cell and pad with `""` or truncate each row to `n_cols_target`.
pub fn normalize_rows(rows: &[Vec<EnumRawCell>], n_cols_target: usize) -> Vec<Vec<EnumCellValue>> {
    rows.iter()
        .map(|row| {
            let mut l_cells: Vec<EnumCellValue> =
                row.iter().take(n_cols_target).map(normalize_cell).collect();
            l_cells.resize(n_cols_target, EnumCellValue::empty());
            l_cells
        })
        .collect()
}

/// Re-normalize an already primitive table: clip text and fix ragged rows.
///
/// Headers are padded with empty names when rows are wider than the headers.
pub fn normalize_table(table: SpecTable) -> SpecTable {
    let n_cols_target = calculate_target_cols(&table.headers, &table.rows);
    let l_rows_raw: Vec<Vec<EnumRawCell>> = table
        .rows
        .into_iter()
        .map(|row| row.into_iter().map(EnumRawCell::from).collect())
        .collect();

    let mut l_headers: Vec<String> = table
        .headers
        .iter()
        .map(|c_name| truncate_cell_text(c_name))
        .collect();
    l_headers.resize(n_cols_target, String::new());

    SpecTable {
        headers: l_headers,
        rows: normalize_rows(&l_rows_raw, n_cols_target),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_normalize_rows_pads_and_truncates_to_target() {
        let rows = vec![
            vec![EnumRawCell::from("a")],
            vec![
                EnumRawCell::from(1.0),
                EnumRawCell::Boolean(true),
                EnumRawCell::Null,
                EnumRawCell::from("dropped"),
            ],
        ];

        let l_rows = normalize_rows(&rows, 3);
        assert_eq!(
            l_rows,
            vec![
                vec![
                    EnumCellValue::from("a"),
                    EnumCellValue::empty(),
                    EnumCellValue::empty()
                ],
                vec![
                    EnumCellValue::Number(1.0),
                    EnumCellValue::Boolean(true),
                    EnumCellValue::empty()
                ],
            ]
        );
    }

    #[test]
    fn test_normalize_cell_coerces_unsupported_values() {
        let dt = Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(
            normalize_cell(&EnumRawCell::DateTime(dt)),
            EnumCellValue::Number(25_570.0)
        );
        assert_eq!(
            normalize_cell(&EnumRawCell::from(&json!({"k": [1, 2]}))),
            EnumCellValue::from(r#"{"k":[1,2]}"#)
        );
        assert_eq!(
            normalize_cell(&EnumRawCell::Number(f64::NEG_INFINITY)),
            EnumCellValue::from("-Inf")
        );
        assert_eq!(normalize_cell(&EnumRawCell::from(&json!(null))), EnumCellValue::empty());
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let c_big = "x".repeat(40_000);
        let row = vec![vec![EnumRawCell::String(c_big)]];

        let l_once = normalize_rows(&row, 1);
        let EnumCellValue::String(c_once) = &l_once[0][0] else {
            panic!("expected text cell");
        };
        assert_eq!(c_once.chars().count(), N_LEN_CELL_TEXT_MAX);
        assert!(c_once.ends_with(C_TRUNCATION_SUFFIX));

        let l_twice = normalize_rows(&[vec![EnumRawCell::String(c_once.clone())]], 1);
        assert_eq!(l_once, l_twice);
    }

    #[test]
    fn test_normalize_table_fixes_ragged_rows() {
        let table = SpecTable::new(
            vec!["A".to_string()],
            vec![
                vec![EnumCellValue::from(1.0), EnumCellValue::from("extra")],
                vec![],
            ],
        );
        let table = normalize_table(table);
        assert_eq!(table.headers, vec!["A".to_string(), String::new()]);
        assert!(table.is_rectangular());
        assert_eq!(table.rows[1], vec![EnumCellValue::empty(), EnumCellValue::empty()]);
    }
}
