//! Combined multi-asset report: asset-wise and datapoint-wise tables in one block.
//!
//! Block rows, top to bottom:
//! - `0`: asset-wise title band
//! - `1..=5`: `SNo.`, `Assets`, `Readings`, oldest and newest timestamps, one column per asset
//! - `6`: spacer
//! - `7`: datapoint-wise title band
//! - `8`: `SNo., Asset, Datapoint, Min, Max, Average`
//! - `9..`: one row per (asset, datapoint)

use std::future::Future;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::conf::{C_NA, C_NUM_FORMAT_DATETIME};
use crate::normalize::normalize_rows;
use crate::spec::{
    EnumCellValue, EnumRawCell, EnumRegionKind, FetchError, GridDate, SpecAssetPayload,
    SpecAssetRef, SpecAssetSummaryEntry, SpecCellFormat, SpecCombinedReport, SpecGridRegion,
};
use crate::summary::{decode_summary_payload, decode_timespan_payload, derive_stat_cell};

const C_TITLE_ASSET_WISE: &str = "Asset-wise Summary";
const C_TITLE_DATAPOINT_WISE: &str = "Datapoint-wise Summary";
const TUP_ASSET_WISE_LABELS: [&str; 5] = [
    "SNo.",
    "Assets",
    "Readings",
    "Oldest Reading Timestamp",
    "Newest Reading Timestamp",
];
const TUP_DATAPOINT_WISE_HEADERS: [&str; 6] = ["SNo.", "Asset", "Datapoint", "Min", "Max", "Average"];

/// Reduce one asset's payloads to a summary entry.
///
/// Unrecognized shapes leave the corresponding fields empty.
pub fn derive_asset_summary_entry(
    asset_ref: &SpecAssetRef,
    payload: &SpecAssetPayload,
) -> SpecAssetSummaryEntry {
    let c_asset = asset_ref.asset_name.as_str();
    let timespan = decode_timespan_payload(&payload.timespan).unwrap_or_else(|| {
        warn!(asset = c_asset, "unrecognized timespan payload in combined report");
        Default::default()
    });
    let datapoint_stats = decode_summary_payload(&payload.summary, c_asset).unwrap_or_else(|| {
        warn!(asset = c_asset, "unrecognized summary payload in combined report");
        Default::default()
    });

    SpecAssetSummaryEntry {
        asset_name: c_asset.to_string(),
        reading_count: payload.reading_count.or(asset_ref.reading_count),
        oldest: timespan.oldest,
        newest: timespan.newest,
        datapoint_stats,
    }
}

fn derive_optional_date_cell(value: Option<GridDate>) -> EnumRawCell {
    value.map_or(EnumRawCell::Null, |g| EnumRawCell::Number(g.value()))
}

fn derive_asset_wise_rows(
    assets: &[SpecAssetRef],
    l_entries: &[Option<SpecAssetSummaryEntry>],
) -> Vec<Vec<EnumRawCell>> {
    let mut l_rows: Vec<Vec<EnumRawCell>> = TUP_ASSET_WISE_LABELS
        .iter()
        .map(|c_label| vec![EnumRawCell::from(*c_label)])
        .collect();

    for (n_idx, (asset_ref, entry)) in assets.iter().zip(l_entries).enumerate() {
        l_rows[0].push(EnumRawCell::Number((n_idx + 1) as f64));
        l_rows[1].push(EnumRawCell::from(asset_ref.asset_name.as_str()));
        match entry {
            Some(entry) => {
                l_rows[2].push(
                    entry
                        .reading_count
                        .map_or(EnumRawCell::Null, |n| EnumRawCell::Number(n as f64)),
                );
                l_rows[3].push(derive_optional_date_cell(entry.oldest));
                l_rows[4].push(derive_optional_date_cell(entry.newest));
            }
            None => {
                for l_row in &mut l_rows[2..] {
                    l_row.push(EnumRawCell::from(C_NA));
                }
            }
        }
    }
    l_rows
}

fn derive_datapoint_wise_rows(
    assets: &[SpecAssetRef],
    l_entries: &[Option<SpecAssetSummaryEntry>],
) -> Vec<Vec<EnumRawCell>> {
    let mut l_rows = Vec::new();
    let mut n_serial = 0usize;
    let mut push_row = |l_cells: Vec<EnumRawCell>| {
        n_serial += 1;
        let mut l_row = vec![EnumRawCell::Number(n_serial as f64)];
        l_row.extend(l_cells);
        l_rows.push(l_row);
    };

    for (asset_ref, entry) in assets.iter().zip(l_entries) {
        let cell_asset = || EnumRawCell::from(asset_ref.asset_name.as_str());
        match entry {
            Some(entry) if !entry.datapoint_stats.is_empty() => {
                for (c_name, stats) in &entry.datapoint_stats {
                    push_row(vec![
                        cell_asset(),
                        EnumRawCell::from(c_name.as_str()),
                        derive_stat_cell(stats.min),
                        derive_stat_cell(stats.max),
                        derive_stat_cell(stats.average),
                    ]);
                }
            }
            Some(_) => push_row(vec![
                cell_asset(),
                EnumRawCell::Null,
                derive_stat_cell(None),
                derive_stat_cell(None),
                derive_stat_cell(None),
            ]),
            None => push_row(vec![
                cell_asset(),
                EnumRawCell::from(C_NA),
                derive_stat_cell(None),
                derive_stat_cell(None),
                derive_stat_cell(None),
            ]),
        }
    }
    l_rows
}

/// Regions tiling a block of `n_width` columns for `n_assets` assets and
/// `n_rows_datapoint` datapoint rows.
fn derive_combined_regions(
    n_assets: usize,
    n_rows_datapoint: usize,
    n_width: usize,
) -> Vec<SpecGridRegion> {
    let n_cols_table2 = TUP_DATAPOINT_WISE_HEADERS.len();
    let fmt_datetime = SpecCellFormat {
        num_format: Some(C_NUM_FORMAT_DATETIME.to_string()),
        ..Default::default()
    };

    let mut l_regions = vec![
        SpecGridRegion::new(0, 0, 1, n_width, EnumRegionKind::Label).merged(),
        SpecGridRegion::new(1, 0, 5, 1, EnumRegionKind::Label),
        SpecGridRegion::new(1, 1, 2, n_assets, EnumRegionKind::Header),
        SpecGridRegion::new(3, 1, 1, n_assets, EnumRegionKind::Value),
        SpecGridRegion::new(4, 1, 2, n_assets, EnumRegionKind::Value).styled(fmt_datetime),
        SpecGridRegion::new(6, 0, 1, n_width, EnumRegionKind::Spacer),
        SpecGridRegion::new(7, 0, 1, n_width, EnumRegionKind::Label).merged(),
        SpecGridRegion::new(8, 0, 1, n_cols_table2, EnumRegionKind::Header),
        SpecGridRegion::new(9, 0, n_rows_datapoint, n_cols_table2, EnumRegionKind::Value),
    ];
    if n_width > 1 + n_assets {
        l_regions.push(SpecGridRegion::new(
            1,
            1 + n_assets,
            5,
            n_width - 1 - n_assets,
            EnumRegionKind::Spacer,
        ));
    }
    if n_width > n_cols_table2 {
        l_regions.push(SpecGridRegion::new(
            8,
            n_cols_table2,
            1 + n_rows_datapoint,
            n_width - n_cols_table2,
            EnumRegionKind::Spacer,
        ));
    }
    l_regions
}

fn derive_no_data_report() -> SpecCombinedReport {
    SpecCombinedReport {
        headers: vec!["No Data".to_string()],
        rows: vec![vec![EnumCellValue::from("No readings found")]],
        regions: vec![
            SpecGridRegion::new(0, 0, 1, 1, EnumRegionKind::Header),
            SpecGridRegion::new(1, 0, 1, 1, EnumRegionKind::Value),
        ],
    }
}

/// Fetch every asset concurrently and build the combined block.
///
/// Every fetch is awaited; a failed asset renders `NA` and never aborts the
/// report. An empty asset list yields the `No Data` sentinel.
pub async fn build_combined_report<F, Fut>(
    assets: &[SpecAssetRef],
    per_asset_fetch: F,
) -> SpecCombinedReport
where
    F: Fn(SpecAssetRef) -> Fut,
    Fut: Future<Output = Result<SpecAssetPayload, FetchError>>,
{
    if assets.is_empty() {
        debug!("no assets, returning sentinel combined report");
        return derive_no_data_report();
    }

    let l_results = join_all(assets.iter().cloned().map(&per_asset_fetch)).await;
    let l_entries: Vec<Option<SpecAssetSummaryEntry>> = assets
        .iter()
        .zip(l_results)
        .map(|(asset_ref, res)| match res {
            Ok(payload) => Some(derive_asset_summary_entry(asset_ref, &payload)),
            Err(err) => {
                warn!(asset = %asset_ref.asset_name, error = %err, "asset fetch failed, rendering NA");
                None
            }
        })
        .collect();

    let n_assets = assets.len();
    let n_width = usize::max(1 + n_assets, TUP_DATAPOINT_WISE_HEADERS.len());

    let l_rows_table1 = derive_asset_wise_rows(assets, &l_entries);
    let l_rows_table2 = derive_datapoint_wise_rows(assets, &l_entries);
    let n_rows_datapoint = l_rows_table2.len();

    let mut l_rows_raw: Vec<Vec<EnumRawCell>> = Vec::with_capacity(9 + n_rows_datapoint);
    l_rows_raw.extend(l_rows_table1);
    l_rows_raw.push(vec![]);
    l_rows_raw.push(vec![EnumRawCell::from(C_TITLE_DATAPOINT_WISE)]);
    l_rows_raw.push(
        TUP_DATAPOINT_WISE_HEADERS
            .iter()
            .map(|c_header| EnumRawCell::from(*c_header))
            .collect(),
    );
    l_rows_raw.extend(l_rows_table2);

    let mut l_headers = vec![C_TITLE_ASSET_WISE.to_string()];
    l_headers.resize(n_width, String::new());

    debug!(
        assets = n_assets,
        failed = l_entries.iter().filter(|e| e.is_none()).count(),
        datapoint_rows = n_rows_datapoint,
        "built combined report"
    );

    SpecCombinedReport {
        headers: l_headers,
        rows: normalize_rows(&l_rows_raw, n_width),
        regions: derive_combined_regions(n_assets, n_rows_datapoint, n_width),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::layout::validate_region_tiling;
    use crate::spec::SpecCellRange;

    fn payload(n_min: f64) -> SpecAssetPayload {
        SpecAssetPayload {
            timespan: json!({"oldest": "2024-01-01 00:00:00", "newest": "2024-01-02 00:00:00"}),
            summary: json!({
                "temp": {"min": n_min, "max": 10, "average": 5},
                "hum": {"min": 1, "max": 2, "average": 1.5},
            }),
            reading_count: Some(42),
        }
    }

    async fn fetch(asset_ref: SpecAssetRef) -> Result<SpecAssetPayload, FetchError> {
        match asset_ref.asset_name.as_str() {
            "b" => Err(FetchError::Timeout("b".to_string())),
            "c" => Ok(SpecAssetPayload {
                timespan: json!({"newest": 1_700_000_000}),
                summary: json!("garbage"),
                reading_count: None,
            }),
            _ => Ok(payload(0.0)),
        }
    }

    fn block_range(report: &SpecCombinedReport) -> SpecCellRange {
        SpecCellRange::new(0, 0, report.rows.len(), report.headers.len() - 1)
    }

    #[tokio::test]
    async fn test_partial_failure_renders_na_column() {
        let assets: Vec<SpecAssetRef> = ["a", "b", "c"].into_iter().map(SpecAssetRef::from).collect();
        let report = build_combined_report(&assets, fetch).await;

        assert_eq!(report.headers.len(), 6);
        assert_eq!(report.headers[0], C_TITLE_ASSET_WISE);
        assert!(report.rows.iter().all(|row| row.len() == 6));

        // Asset-wise table: one column per asset.
        assert_eq!(report.rows[0][0], EnumCellValue::from("SNo."));
        assert_eq!(report.rows[1][2], EnumCellValue::from("b"));
        assert_eq!(report.rows[2][1], EnumCellValue::Number(42.0));
        assert_eq!(report.rows[2][2], EnumCellValue::na());
        assert_eq!(report.rows[3][2], EnumCellValue::na());
        assert_eq!(report.rows[3][3], EnumCellValue::empty());
        assert!(matches!(report.rows[4][3], EnumCellValue::Number(_)));
        assert_eq!(report.rows[0][4], EnumCellValue::empty());

        assert!(validate_region_tiling(&report.regions, &block_range(&report)).is_ok());
    }

    #[tokio::test]
    async fn test_datapoint_rows_sorted_with_continuous_serials() {
        let assets: Vec<SpecAssetRef> = ["a", "b", "c"].into_iter().map(SpecAssetRef::from).collect();
        let report = build_combined_report(&assets, fetch).await;

        let l_table2 = &report.rows[8..];
        assert_eq!(l_table2.len(), 4);
        let l_serials: Vec<EnumCellValue> = l_table2.iter().map(|row| row[0].clone()).collect();
        let l_expected: Vec<EnumCellValue> =
            (1..=4).map(|n| EnumCellValue::Number(n as f64)).collect();
        assert_eq!(l_serials, l_expected);
        assert_eq!(l_table2[0][2], EnumCellValue::from("hum"));
        assert_eq!(l_table2[1][2], EnumCellValue::from("temp"));
        assert_eq!(l_table2[1][3], EnumCellValue::Number(0.0));
        assert_eq!(l_table2[2][1], EnumCellValue::from("b"));
        assert_eq!(l_table2[2][5], EnumCellValue::na());
        assert_eq!(l_table2[3][2], EnumCellValue::empty());
    }

    #[tokio::test]
    async fn test_wide_block_and_empty_inventory() {
        let assets: Vec<SpecAssetRef> = (0..8).map(|n| SpecAssetRef::from(format!("s{n}"))).collect();
        let report = build_combined_report(&assets, fetch).await;
        assert_eq!(report.headers.len(), 9);
        assert!(validate_region_tiling(&report.regions, &block_range(&report)).is_ok());

        let report_empty = build_combined_report(&[], fetch).await;
        assert_eq!(report_empty.headers, vec!["No Data".to_string()]);
        assert!(validate_region_tiling(&report_empty.regions, &block_range(&report_empty)).is_ok());
    }
}
