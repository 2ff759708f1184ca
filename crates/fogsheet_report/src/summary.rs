//! Summary and timespan tables, upstream shape detection and local derivation.
//!
//! Aggregate endpoints answer in several shapes. Decoding is a fixed, ordered
//! list of detectors; the first detector that recognizes the payload wins and
//! an unrecognized payload renders as `NA` instead of failing.

use std::collections::BTreeMap;

use chrono::SecondsFormat;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::conf::C_NA;
use crate::normalize::{calculate_target_cols, normalize_rows};
use crate::spec::{EnumRawCell, GridDate, SpecDatapointStats, SpecReadingRecord, SpecTable};
use crate::timeval::{from_grid_date, grid_date_from_json, to_grid_date};

const TUP_STAT_KEYS: [&str; 7] = ["min", "max", "average", "minimum", "maximum", "avg", "mean"];
const TUP_MIN_KEYS: [&str; 2] = ["min", "minimum"];
const TUP_MAX_KEYS: [&str; 2] = ["max", "maximum"];
const TUP_AVERAGE_KEYS: [&str; 3] = ["average", "avg", "mean"];
const TUP_WRAPPER_KEYS: [&str; 2] = ["summary", "data"];
const TUP_NAME_KEYS: [&str; 2] = ["datapoint", "name"];

/// Keys probed, in order, for the oldest timestamp.
pub const TUP_OLDEST_KEYS: [&str; 7] = [
    "oldest", "start", "first", "minimum", "min", "from", "earliest",
];
/// Keys probed, in order, for the newest timestamp.
pub const TUP_NEWEST_KEYS: [&str; 7] = ["newest", "end", "last", "maximum", "max", "to", "latest"];

/// Decoded summary: statistics keyed by datapoint name.
pub type DictDatapointStats = BTreeMap<String, SpecDatapointStats>;

type FnSummaryDetector = fn(&Value, &str) -> Option<DictDatapointStats>;

/// Ordered shape detectors for summary payloads.
const TUP_SUMMARY_DETECTORS: [(&str, FnSummaryDetector); 4] = [
    ("wrapped", detect_wrapped_summary),
    ("flat", detect_flat_summary),
    ("keyed", detect_keyed_summary),
    ("array", detect_array_summary),
];

////////////////////////////////////////////////////////////////////////////////
// #region SummaryDecoding

fn derive_f64_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn derive_first_f64(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|c_key| obj.get(*c_key).and_then(derive_f64_from_json))
}

fn is_flat_stats_object(obj: &Map<String, Value>) -> bool {
    TUP_STAT_KEYS.iter().any(|c_key| obj.contains_key(*c_key))
}

fn decode_stats_object(obj: &Map<String, Value>) -> Option<SpecDatapointStats> {
    if !is_flat_stats_object(obj) {
        return None;
    }
    Some(SpecDatapointStats {
        min: derive_first_f64(obj, &TUP_MIN_KEYS),
        max: derive_first_f64(obj, &TUP_MAX_KEYS),
        average: derive_first_f64(obj, &TUP_AVERAGE_KEYS),
    })
}

fn detect_wrapped_summary(payload: &Value, name_default: &str) -> Option<DictDatapointStats> {
    let obj = payload.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    let inner = TUP_WRAPPER_KEYS.iter().find_map(|c_key| obj.get(*c_key))?;
    // `{"data": {min, max, ...}}` is a datapoint named `data`, not a wrapper.
    if inner.as_object().is_some_and(is_flat_stats_object) {
        return None;
    }
    decode_summary_payload(inner, name_default)
}

fn detect_flat_summary(payload: &Value, name_default: &str) -> Option<DictDatapointStats> {
    let obj = payload.as_object()?;
    let stats = decode_stats_object(obj)?;
    let c_name = TUP_NAME_KEYS
        .iter()
        .find_map(|c_key| obj.get(*c_key).and_then(Value::as_str))
        .unwrap_or(name_default);
    Some(BTreeMap::from([(c_name.to_string(), stats)]))
}

fn detect_keyed_summary(payload: &Value, _name_default: &str) -> Option<DictDatapointStats> {
    let obj = payload.as_object()?;
    let dict_stats: DictDatapointStats = obj
        .iter()
        .filter_map(|(c_name, value)| {
            value
                .as_object()
                .and_then(decode_stats_object)
                .map(|stats| (c_name.clone(), stats))
        })
        .collect();
    (!dict_stats.is_empty()).then_some(dict_stats)
}

fn detect_array_summary(payload: &Value, name_default: &str) -> Option<DictDatapointStats> {
    let l_items = payload.as_array()?;
    let mut dict_stats = BTreeMap::new();
    for item in l_items {
        let decoded = detect_flat_summary(item, name_default)
            .or_else(|| detect_keyed_summary(item, name_default));
        if let Some(dict_item) = decoded {
            dict_stats.extend(dict_item);
        }
    }
    (!dict_stats.is_empty()).then_some(dict_stats)
}

/// Run the detectors in order; `None` when no detector recognizes the payload.
///
/// `name_default` names the single entry of an already-flat stats object.
pub fn decode_summary_payload(payload: &Value, name_default: &str) -> Option<DictDatapointStats> {
    TUP_SUMMARY_DETECTORS
        .iter()
        .find_map(|(c_shape, detector)| {
            let decoded = detector(payload, name_default)?;
            debug!(shape = *c_shape, datapoints = decoded.len(), "decoded summary payload");
            Some(decoded)
        })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TimespanDecoding

/// Oldest/newest pair. Fields are `None` when the key is absent or unparseable.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpecTimespan {
    /// Oldest reading timestamp.
    pub oldest: Option<GridDate>,
    /// Newest reading timestamp.
    pub newest: Option<GridDate>,
}

fn derive_first_grid_date(obj: &Map<String, Value>, keys: &[&str]) -> Option<GridDate> {
    keys.iter()
        .find_map(|c_key| obj.get(*c_key).and_then(grid_date_from_json))
}

/// Decode a timespan payload; `None` when it is not an object at all.
pub fn decode_timespan_payload(payload: &Value) -> Option<SpecTimespan> {
    match payload {
        Value::Object(obj) => {
            if obj.len() == 1
                && let Some(inner) = ["timespan", "data"].iter().find_map(|c_key| obj.get(*c_key))
                && inner.is_object()
            {
                return decode_timespan_payload(inner);
            }
            Some(SpecTimespan {
                oldest: derive_first_grid_date(obj, &TUP_OLDEST_KEYS),
                newest: derive_first_grid_date(obj, &TUP_NEWEST_KEYS),
            })
        }
        Value::Array(items) => items.iter().find(|item| item.is_object()).and_then(decode_timespan_payload),
        _ => None,
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region LocalDerivation

#[derive(Debug, Clone, Copy)]
struct SpecStatsAccumulator {
    n_min: f64,
    n_max: f64,
    n_sum: f64,
    n_count: u64,
}

impl SpecStatsAccumulator {
    fn new(value: f64) -> Self {
        Self {
            n_min: value,
            n_max: value,
            n_sum: value,
            n_count: 1,
        }
    }

    fn push(&mut self, value: f64) {
        self.n_min = f64::min(self.n_min, value);
        self.n_max = f64::max(self.n_max, value);
        self.n_sum += value;
        self.n_count += 1;
    }

    fn finish(&self) -> SpecDatapointStats {
        SpecDatapointStats {
            min: Some(self.n_min),
            max: Some(self.n_max),
            average: Some(self.n_sum / self.n_count as f64),
        }
    }
}

/// Aggregates derived locally from raw readings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecLocalAggregate {
    /// Readings considered.
    pub reading_count: u64,
    /// Earliest parseable timestamp.
    pub oldest: Option<GridDate>,
    /// Latest parseable timestamp.
    pub newest: Option<GridDate>,
    /// Statistics over numeric values per datapoint.
    pub datapoint_stats: DictDatapointStats,
}

impl SpecLocalAggregate {
    /// Encode as a timespan payload of RFC 3339 strings with milliseconds.
    ///
    /// Tagged text decodes back exactly, unlike a bare serial.
    pub fn to_timespan_json(&self) -> Value {
        let encode = |value: Option<GridDate>| {
            value
                .and_then(from_grid_date)
                .map_or(Value::Null, |dt| {
                    Value::from(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
                })
        };
        let mut obj = Map::new();
        obj.insert("oldest".to_string(), encode(self.oldest));
        obj.insert("newest".to_string(), encode(self.newest));
        Value::Object(obj)
    }

    /// Encode as a keyed summary payload (`{dp: {min, max, average}}`).
    pub fn to_summary_json(&self) -> Value {
        let encode = |value: Option<f64>| value.map_or(Value::Null, Value::from);
        let obj: Map<String, Value> = self
            .datapoint_stats
            .iter()
            .map(|(c_name, stats)| {
                let mut obj_stats = Map::new();
                obj_stats.insert("min".to_string(), encode(stats.min));
                obj_stats.insert("max".to_string(), encode(stats.max));
                obj_stats.insert("average".to_string(), encode(stats.average));
                (c_name.clone(), Value::Object(obj_stats))
            })
            .collect();
        Value::Object(obj)
    }
}

/// Compute count, oldest, newest and min/max/average in one pass.
///
/// With `datapoint` set, only readings carrying that datapoint are counted.
/// Non-numeric values are ignored for statistics.
pub fn derive_local_aggregate(
    readings: &[SpecReadingRecord],
    datapoint: Option<&str>,
) -> SpecLocalAggregate {
    let mut n_count = 0u64;
    let mut oldest: Option<GridDate> = None;
    let mut newest: Option<GridDate> = None;
    let mut dict_acc: BTreeMap<&str, SpecStatsAccumulator> = BTreeMap::new();

    for record in readings {
        if let Some(c_datapoint) = datapoint
            && !record.values.contains_key(c_datapoint)
        {
            continue;
        }
        n_count += 1;

        if let Some(grid_date) = to_grid_date(&record.timestamp) {
            oldest = Some(oldest.map_or(grid_date, |g| if grid_date < g { grid_date } else { g }));
            newest = Some(newest.map_or(grid_date, |g| if grid_date > g { grid_date } else { g }));
        }

        for (c_name, value) in &record.values {
            if datapoint.is_some_and(|c_datapoint| c_datapoint != c_name.as_str()) {
                continue;
            }
            let Some(n_value) = value.as_f64().filter(|n| n.is_finite()) else {
                continue;
            };
            dict_acc
                .entry(c_name.as_str())
                .and_modify(|acc| acc.push(n_value))
                .or_insert_with(|| SpecStatsAccumulator::new(n_value));
        }
    }

    SpecLocalAggregate {
        reading_count: n_count,
        oldest,
        newest,
        datapoint_stats: dict_acc
            .into_iter()
            .map(|(c_name, acc)| (c_name.to_string(), acc.finish()))
            .collect(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Tables

/// Render an optional statistic; `None` is `NA`.
pub fn derive_stat_cell(value: Option<f64>) -> EnumRawCell {
    match value {
        Some(n) => EnumRawCell::Number(n),
        None => EnumRawCell::from(C_NA),
    }
}

fn derive_grid_date_cell(value: Option<GridDate>) -> EnumRawCell {
    value.map_or(EnumRawCell::Null, |g| EnumRawCell::Number(g.value()))
}

fn finish_table(l_headers: Vec<String>, l_rows_raw: Vec<Vec<EnumRawCell>>) -> SpecTable {
    let n_cols_target = calculate_target_cols(&l_headers, &l_rows_raw);
    SpecTable {
        rows: normalize_rows(&l_rows_raw, n_cols_target),
        headers: l_headers,
    }
}

fn derive_summary_headers() -> Vec<String> {
    ["Asset Name", "Datapoint", "Min", "Max", "Average"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn derive_timespan_headers() -> Vec<String> {
    [
        "Asset Name",
        "Datapoint",
        "Oldest Reading Timestamp",
        "Newest Reading Timestamp",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn derive_summary_rows(
    asset_name: &str,
    dict_stats: Option<&DictDatapointStats>,
    datapoint: Option<&str>,
) -> Vec<Vec<EnumRawCell>> {
    let na_row = |c_datapoint: &str| {
        vec![
            EnumRawCell::from(asset_name),
            EnumRawCell::from(c_datapoint),
            derive_stat_cell(None),
            derive_stat_cell(None),
            derive_stat_cell(None),
        ]
    };
    let stats_row = |c_datapoint: &str, stats: &SpecDatapointStats| {
        vec![
            EnumRawCell::from(asset_name),
            EnumRawCell::from(c_datapoint),
            derive_stat_cell(stats.min),
            derive_stat_cell(stats.max),
            derive_stat_cell(stats.average),
        ]
    };

    let Some(dict_stats) = dict_stats.filter(|dict| !dict.is_empty()) else {
        return vec![na_row(datapoint.unwrap_or(""))];
    };
    match datapoint {
        Some(c_datapoint) => match dict_stats.get(c_datapoint) {
            Some(stats) => vec![stats_row(c_datapoint, stats)],
            None if dict_stats.len() == 1 => dict_stats
                .values()
                .map(|stats| stats_row(c_datapoint, stats))
                .collect(),
            None => vec![na_row(c_datapoint)],
        },
        None => dict_stats
            .iter()
            .map(|(c_name, stats)| stats_row(c_name, stats))
            .collect(),
    }
}

/// Build the summary table from an upstream payload of any known shape.
///
/// One row per datapoint, sorted by name; unrecognized payloads give one `NA` row.
pub fn build_summary_table(payload: &Value, asset_name: &str, datapoint: Option<&str>) -> SpecTable {
    let dict_stats = decode_summary_payload(payload, datapoint.unwrap_or(asset_name));
    if dict_stats.is_none() {
        warn!(asset = asset_name, "unrecognized summary payload, rendering NA");
    }
    finish_table(
        derive_summary_headers(),
        derive_summary_rows(asset_name, dict_stats.as_ref(), datapoint),
    )
}

fn derive_timespan_row(
    asset_name: &str,
    timespan: Option<SpecTimespan>,
    datapoint: Option<&str>,
) -> Vec<EnumRawCell> {
    let mut l_row = vec![
        EnumRawCell::from(asset_name),
        EnumRawCell::from(datapoint.unwrap_or("All")),
    ];
    match timespan {
        Some(timespan) => {
            l_row.push(derive_grid_date_cell(timespan.oldest));
            l_row.push(derive_grid_date_cell(timespan.newest));
        }
        None => {
            l_row.push(derive_stat_cell(None));
            l_row.push(derive_stat_cell(None));
        }
    }
    l_row
}

/// Build the timespan table; missing keys give empty cells, malformed payloads `NA`.
pub fn build_timespan_table(
    payload: &Value,
    asset_name: &str,
    datapoint: Option<&str>,
) -> SpecTable {
    let timespan = decode_timespan_payload(payload);
    if timespan.is_none() {
        warn!(asset = asset_name, "unrecognized timespan payload, rendering NA");
    }
    finish_table(
        derive_timespan_headers(),
        vec![derive_timespan_row(asset_name, timespan, datapoint)],
    )
}

/// Summary table derived from raw readings; empty input gives the sentinel.
pub fn build_summary_table_from_readings(
    readings: &[SpecReadingRecord],
    asset_name: &str,
    datapoint: Option<&str>,
) -> SpecTable {
    if readings.is_empty() {
        return SpecTable::no_data();
    }
    let aggregate = derive_local_aggregate(readings, datapoint);
    finish_table(
        derive_summary_headers(),
        derive_summary_rows(asset_name, Some(&aggregate.datapoint_stats), datapoint),
    )
}

/// Timespan table derived from raw readings; empty input gives the sentinel.
pub fn build_timespan_table_from_readings(
    readings: &[SpecReadingRecord],
    asset_name: &str,
    datapoint: Option<&str>,
) -> SpecTable {
    if readings.is_empty() {
        return SpecTable::no_data();
    }
    let aggregate = derive_local_aggregate(readings, datapoint);
    let timespan = SpecTimespan {
        oldest: aggregate.oldest,
        newest: aggregate.newest,
    };
    finish_table(
        derive_timespan_headers(),
        vec![derive_timespan_row(asset_name, Some(timespan), datapoint)],
    )
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
