//! Field-by-instance status matrix.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::conf::{
    C_LIST_BULLET, C_LIST_TEXT_PREFIX, C_NA, TUP_STATUS_PING_FIELDS, TUP_STATUS_STATISTICS_KEYS,
};
use crate::fetch::decode_asset_list;
use crate::normalize::{calculate_target_cols, normalize_rows};
use crate::spec::{EnumRawCell, FetchError, SpecInstanceStatusPayload, SpecTable};

/// Render one status value.
///
/// Booleans become `TRUE`/`FALSE`, missing values `NA` and arrays a bullet list.
pub fn derive_status_cell(value: Option<&Value>) -> EnumRawCell {
    match value {
        None | Some(Value::Null) => EnumRawCell::from(C_NA),
        Some(Value::Bool(b)) => EnumRawCell::from(if *b { "TRUE" } else { "FALSE" }),
        Some(Value::Number(n)) => n.as_f64().map_or(EnumRawCell::from(C_NA), EnumRawCell::Number),
        Some(Value::String(s)) => EnumRawCell::String(s.clone()),
        Some(Value::Array(items)) => {
            if items.is_empty() {
                return EnumRawCell::Null;
            }
            let c_lines = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => format!("{C_LIST_BULLET}{s}"),
                    other => format!("{C_LIST_BULLET}{other}"),
                })
                .collect::<Vec<_>>()
                .join("\n");
            EnumRawCell::String(format!("{C_LIST_TEXT_PREFIX}{c_lines}"))
        }
        Some(other @ Value::Object(_)) => EnumRawCell::Json(other.clone()),
    }
}

/// Statistics as `key -> value`, from `[{key, value}]` or a plain object.
pub fn decode_statistics(payload: &Value) -> BTreeMap<String, Value> {
    match payload {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let c_key = item.get("key")?.as_str()?;
                Some((c_key.to_string(), item.get("value").cloned().unwrap_or(Value::Null)))
            })
            .collect(),
        Value::Object(obj) => obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => BTreeMap::new(),
    }
}

struct SpecInstanceColumn {
    ping: Value,
    dict_statistics: BTreeMap<String, Value>,
    dict_assets: Option<BTreeMap<String, Option<u64>>>,
}

impl SpecInstanceColumn {
    fn from_payload(payload: &SpecInstanceStatusPayload) -> Self {
        let dict_assets = (!payload.assets.is_null()).then(|| {
            decode_asset_list(&payload.assets)
                .into_iter()
                .map(|asset_ref| (asset_ref.asset_name, asset_ref.reading_count))
                .collect()
        });
        Self {
            ping: payload.ping.clone(),
            dict_statistics: decode_statistics(&payload.statistics),
            dict_assets,
        }
    }
}

/// Fetch every instance concurrently and build the status matrix.
///
/// Rows: ping fields, statistics keys, asset count, then the sorted union of
/// asset names. A failed instance renders an all-`NA` column; an instance
/// lacking an asset shows `NA` for it while a zero count stays `0`.
pub async fn build_status_report<F, Fut>(urls: &[String], per_instance_fetch: F) -> SpecTable
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<SpecInstanceStatusPayload, FetchError>>,
{
    let l_results = join_all(urls.iter().cloned().map(&per_instance_fetch)).await;
    let l_columns: Vec<Option<SpecInstanceColumn>> = urls
        .iter()
        .zip(l_results)
        .map(|(c_url, res)| match res {
            Ok(payload) => Some(SpecInstanceColumn::from_payload(&payload)),
            Err(err) => {
                warn!(url = %c_url, error = %err, "instance status failed, rendering NA");
                None
            }
        })
        .collect();

    let set_asset_names: BTreeSet<&String> = l_columns
        .iter()
        .flatten()
        .filter_map(|col| col.dict_assets.as_ref())
        .flat_map(|dict| dict.keys())
        .collect();

    let build_row = |c_label: &str, derive: &dyn Fn(&SpecInstanceColumn) -> EnumRawCell| {
        let mut l_row = vec![EnumRawCell::from(c_label)];
        l_row.extend(l_columns.iter().map(|col| match col {
            Some(col) => derive(col),
            None => EnumRawCell::from(C_NA),
        }));
        l_row
    };

    let mut l_rows_raw: Vec<Vec<EnumRawCell>> = Vec::new();
    for (c_key, c_label) in TUP_STATUS_PING_FIELDS {
        l_rows_raw.push(build_row(c_label, &|col| derive_status_cell(col.ping.get(c_key))));
    }
    for c_key in TUP_STATUS_STATISTICS_KEYS {
        l_rows_raw.push(build_row(c_key, &|col| {
            derive_status_cell(col.dict_statistics.get(c_key))
        }));
    }
    l_rows_raw.push(build_row("Asset Count", &|col| match &col.dict_assets {
        Some(dict) => EnumRawCell::Number(dict.len() as f64),
        None => EnumRawCell::from(C_NA),
    }));
    for c_asset in &set_asset_names {
        l_rows_raw.push(build_row(c_asset.as_str(), &|col| {
            match col.dict_assets.as_ref().and_then(|dict| dict.get(*c_asset)) {
                Some(Some(n_count)) => EnumRawCell::Number(*n_count as f64),
                Some(None) => EnumRawCell::Null,
                None => EnumRawCell::from(C_NA),
            }
        }));
    }

    let mut l_headers = vec!["Field".to_string()];
    l_headers.extend(urls.iter().cloned());

    debug!(
        instances = urls.len(),
        assets = set_asset_names.len(),
        rows = l_rows_raw.len(),
        "built status report"
    );

    let n_cols_target = calculate_target_cols(&l_headers, &l_rows_raw);
    SpecTable {
        rows: normalize_rows(&l_rows_raw, n_cols_target),
        headers: l_headers,
    }
}
