//! Raw-mode tables: one row per reading.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::normalize::{calculate_target_cols, normalize_rows};
use crate::spec::{EnumRawCell, EnumRawTimestamp, EnumReadingValue, SpecReadingRecord, SpecTable};
use crate::timeval::to_grid_date;

const TUP_TIMESTAMP_KEYS: [&str; 3] = ["timestamp", "user_ts", "ts"];
const TUP_ASSET_KEYS: [&str; 3] = ["asset_code", "assetCode", "asset"];
const TUP_RESERVED_KEYS: [&str; 8] = [
    "timestamp",
    "user_ts",
    "ts",
    "asset_code",
    "assetCode",
    "asset",
    "id",
    "reading",
];

////////////////////////////////////////////////////////////////////////////////
// #region Decoding

/// Decode an upstream readings payload into records.
///
/// Accepts `[{timestamp, reading: {..}}]`, flat `[{timestamp, <dp>: v}]` (the
/// per-datapoint endpoint) and either wrapped in `{"rows": [...]}`. Items that
/// are not objects are skipped.
pub fn decode_readings(payload: &Value, asset_name: &str) -> Vec<SpecReadingRecord> {
    let l_items: &[Value] = match payload {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("rows").or_else(|| obj.get("readings")) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    l_items
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| decode_reading_object(obj, asset_name))
        .collect()
}

fn decode_reading_object(obj: &Map<String, Value>, asset_name: &str) -> SpecReadingRecord {
    let timestamp = TUP_TIMESTAMP_KEYS
        .iter()
        .find_map(|c_key| obj.get(*c_key))
        .map_or(EnumRawTimestamp::Missing, EnumRawTimestamp::from);

    let c_asset_name = TUP_ASSET_KEYS
        .iter()
        .find_map(|c_key| obj.get(*c_key).and_then(Value::as_str))
        .unwrap_or(asset_name);

    let mut dict_values = BTreeMap::new();
    match obj.get("reading") {
        Some(Value::Object(reading)) => {
            for (c_name, value) in reading {
                if let Some(val) = EnumReadingValue::from_json(value) {
                    dict_values.insert(c_name.clone(), val);
                }
            }
        }
        _ => {
            for (c_name, value) in obj {
                if TUP_RESERVED_KEYS.contains(&c_name.as_str()) {
                    continue;
                }
                if let Some(val) = EnumReadingValue::from_json(value) {
                    dict_values.insert(c_name.clone(), val);
                }
            }
        }
    }

    SpecReadingRecord::new(timestamp, c_asset_name, dict_values)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RawTable

/// Datapoint columns for a raw table.
///
/// An explicit choice wins; a single distinct name collapses to one column;
/// otherwise every name, sorted.
pub fn select_datapoint_columns(
    readings: &[SpecReadingRecord],
    datapoint: Option<&str>,
) -> Vec<String> {
    if let Some(c_datapoint) = datapoint {
        return vec![c_datapoint.to_string()];
    }
    let set_names: BTreeSet<&String> = readings.iter().flat_map(|r| r.values.keys()).collect();
    set_names.into_iter().cloned().collect()
}

/// Build the raw readings table for one asset.
///
/// Zero readings yield the `No Data` sentinel.
pub fn build_raw_table(
    readings: &[SpecReadingRecord],
    asset_name: &str,
    datapoint: Option<&str>,
) -> SpecTable {
    if readings.is_empty() {
        debug!(asset = asset_name, "no readings, returning sentinel table");
        return SpecTable::no_data();
    }

    let l_datapoints = select_datapoint_columns(readings, datapoint);
    let mut l_headers = vec!["Timestamp".to_string(), "Asset Name".to_string()];
    l_headers.extend(l_datapoints.iter().cloned());

    let mut n_unparsed = 0usize;
    let l_rows_raw: Vec<Vec<EnumRawCell>> = readings
        .iter()
        .map(|record| {
            let cell_ts = match to_grid_date(&record.timestamp) {
                Some(grid_date) => EnumRawCell::Number(grid_date.value()),
                None => {
                    n_unparsed += 1;
                    EnumRawCell::Null
                }
            };
            let c_asset = if record.asset_name.is_empty() {
                asset_name
            } else {
                record.asset_name.as_str()
            };

            let mut l_row = Vec::with_capacity(l_headers.len());
            l_row.push(cell_ts);
            l_row.push(EnumRawCell::from(c_asset));
            for c_name in &l_datapoints {
                l_row.push(
                    record
                        .values
                        .get(c_name)
                        .map_or(EnumRawCell::Null, EnumReadingValue::to_raw_cell),
                );
            }
            l_row
        })
        .collect();

    debug!(
        asset = asset_name,
        rows = l_rows_raw.len(),
        datapoints = l_datapoints.len(),
        unparsed_timestamps = n_unparsed,
        "built raw table"
    );

    let n_cols_target = calculate_target_cols(&l_headers, &l_rows_raw);
    SpecTable {
        rows: normalize_rows(&l_rows_raw, n_cols_target),
        headers: l_headers,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::spec::EnumCellValue;

    fn record(ts: &str, values: &[(&str, f64)]) -> SpecReadingRecord {
        SpecReadingRecord::new(
            EnumRawTimestamp::from(ts),
            "sensor1",
            values
                .iter()
                .map(|(k, v)| (k.to_string(), EnumReadingValue::Number(*v)))
                .collect(),
        )
    }

    #[test]
    fn test_empty_readings_return_sentinel() {
        let table = build_raw_table(&[], "sensor1", None);
        assert_eq!(table.headers, vec!["No Data".to_string()]);
        assert_eq!(table.rows, vec![vec![EnumCellValue::from("No readings found")]]);
    }

    #[test]
    fn test_single_datapoint_collapses_to_one_column() {
        let readings = vec![
            record("2024-01-01 00:00:00.000000", &[("temp", 20.5)]),
            record("2024-01-01 00:00:01.000000", &[("temp", 21.0)]),
        ];
        let table = build_raw_table(&readings, "sensor1", None);
        assert_eq!(table.headers, vec!["Timestamp", "Asset Name", "temp"]);
        assert!(table.is_rectangular());
        assert_eq!(table.rows[1][2], EnumCellValue::Number(21.0));
    }

    #[test]
    fn test_multiple_datapoints_sorted_and_padded() {
        let readings = vec![
            record("2024-01-01 00:00:00", &[("zeta", 1.0), ("alpha", 2.0)]),
            record("garbage", &[("mid", 3.0)]),
        ];
        let table = build_raw_table(&readings, "sensor1", None);
        assert_eq!(
            table.headers,
            vec!["Timestamp", "Asset Name", "alpha", "mid", "zeta"]
        );
        assert!(table.is_rectangular());
        assert_eq!(table.rows[1][0], EnumCellValue::empty());
        assert_eq!(table.rows[1][2], EnumCellValue::empty());
        assert_eq!(table.rows[1][3], EnumCellValue::Number(3.0));
    }

    #[test]
    fn test_explicit_datapoint_wins() {
        let readings = vec![record("2024-01-01 00:00:00", &[("a", 1.0), ("b", 2.0)])];
        let table = build_raw_table(&readings, "sensor1", Some("b"));
        assert_eq!(table.headers, vec!["Timestamp", "Asset Name", "b"]);
        assert_eq!(table.rows[0][2], EnumCellValue::Number(2.0));
    }

    #[test]
    fn test_decode_readings_accepts_nested_and_flat_shapes() {
        let nested = json!([
            {"timestamp": "2024-01-01 00:00:00.000000", "reading": {"temp": 1.5, "unit": "C"}},
            "not-an-object"
        ]);
        let l_records = decode_readings(&nested, "sensor1");
        assert_eq!(l_records.len(), 1);
        assert_eq!(l_records[0].asset_name, "sensor1");
        assert_eq!(l_records[0].values["temp"], EnumReadingValue::Number(1.5));
        assert_eq!(
            l_records[0].values["unit"],
            EnumReadingValue::Text("C".to_string())
        );

        let flat = json!({"rows": [{"timestamp": 1_700_000_000, "asset_code": "other", "temp": 2}]});
        let l_records = decode_readings(&flat, "sensor1");
        assert_eq!(l_records[0].asset_name, "other");
        assert_eq!(l_records[0].timestamp, EnumRawTimestamp::Number(1_700_000_000.0));
        assert_eq!(l_records[0].values.len(), 1);

        assert!(decode_readings(&json!({"message": "nope"}), "sensor1").is_empty());
    }
}
