//! Report orchestration: fetch, build, place and chart one report.

use serde_json::Value;
use tracing::{info, warn};

use crate::chart::{build_chart_spec, derive_axis_span};
use crate::combined::build_combined_report;
use crate::conf::N_LEN_SHEET_NAME_MAX;
use crate::fetch::{
    ReadingsSource, decode_asset_list, fetch_asset_payload, fetch_instance_status,
    fetch_with_retry,
};
use crate::layout::{compose_combined_layout, compose_table_layout};
use crate::reading::{build_raw_table, decode_readings};
use crate::spec::{
    EnumCellValue, EnumReportMode, FetchError, GridDate, ReportError, SpecAssetRef,
    SpecCellRange, SpecChart, SpecGridLayout, SpecReadingRecord, SpecReportOptions,
    SpecReportPackage, SpecReportRequest, SpecTable,
};
use crate::status::build_status_report;
use crate::summary::{
    build_summary_table, build_summary_table_from_readings, build_timespan_table,
    build_timespan_table_from_readings,
};
use crate::util::derive_sheet_name;

const C_SHEET_COMBINED: &str = "Combined";
const C_SHEET_STATUS: &str = "Status";
/// Columns before the datapoint columns in a raw table.
const N_COLS_RAW_FIXED: usize = 2;

////////////////////////////////////////////////////////////////////////////////
// #region Naming

/// Right-hand part of the sheet name for a request.
///
/// Raw reports use the asset, aggregate reports `asset-Mode`, combined reports
/// a fixed label.
pub fn derive_report_sheet_suffix(mode: EnumReportMode, asset_name: &str) -> String {
    match mode {
        EnumReportMode::Raw => asset_name.to_string(),
        EnumReportMode::Summary | EnumReportMode::Timespan => format!("{asset_name}-{mode}"),
        EnumReportMode::Combined => C_SHEET_COMBINED.to_string(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Charting

fn derive_grid_dates(table: &SpecTable) -> Vec<GridDate> {
    table
        .rows
        .iter()
        .filter_map(|row| match row.first() {
            Some(EnumCellValue::Number(n)) => Some(GridDate(*n)),
            _ => None,
        })
        .collect()
}

fn derive_raw_chart(
    table: &SpecTable,
    layout: &SpecGridLayout,
    options: &SpecReportOptions,
) -> Option<SpecChart> {
    let band = layout.chart_band?;
    if table.width() <= N_COLS_RAW_FIXED || table.height() == 0 {
        return None;
    }
    let row_end = layout.row_data_start + table.height() - 1;
    let col_origin = layout.col_origin;
    build_chart_spec(
        &derive_grid_dates(table),
        SpecCellRange::new(
            layout.row_data_start,
            col_origin + N_COLS_RAW_FIXED,
            row_end,
            col_origin + table.width() - 1,
        ),
        table.headers[N_COLS_RAW_FIXED..].to_vec(),
        SpecCellRange::new(layout.row_data_start, col_origin, row_end, col_origin),
        band,
        options.legend_position,
    )
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Orchestration

async fn fetch_readings(
    source: &dyn ReadingsSource,
    request: &SpecReportRequest,
    asset_name: &str,
    options: &SpecReportOptions,
) -> Result<Vec<SpecReadingRecord>, FetchError> {
    let payload = fetch_with_retry(&options.retry, asset_name, || {
        source.readings(asset_name, request.datapoint.as_deref(), &request.query)
    })
    .await?;
    Ok(decode_readings(&payload, asset_name))
}

async fn build_raw_package(
    source: &dyn ReadingsSource,
    request: &SpecReportRequest,
    asset_name: &str,
    options: &SpecReportOptions,
    package: &mut SpecReportPackage,
) {
    let l_readings = match fetch_readings(source, request, asset_name, options).await {
        Ok(l_readings) => l_readings,
        Err(err) => {
            warn!(asset = asset_name, error = %err, "readings fetch failed");
            package.warn(format!("readings unavailable for {asset_name}: {err}"));
            vec![]
        }
    };
    let table = build_raw_table(&l_readings, asset_name, request.datapoint.as_deref());

    let if_chartable = options.if_include_chart
        && table.width() > N_COLS_RAW_FIXED
        && derive_axis_span(&derive_grid_dates(&table)).is_some();
    let mut layout_options = options.layout.clone();
    layout_options.n_rows_chart_band = if if_chartable {
        options.n_rows_chart_band()
    } else {
        0
    };

    package.layout = compose_table_layout(&table, &layout_options);
    package.chart = derive_raw_chart(&table, &package.layout, options);
}

async fn build_aggregate_package(
    source: &dyn ReadingsSource,
    request: &SpecReportRequest,
    asset_name: &str,
    options: &SpecReportOptions,
    package: &mut SpecReportPackage,
) {
    let datapoint = request.datapoint.as_deref();
    let if_summary = request.mode == EnumReportMode::Summary;
    let res_aggregate = fetch_with_retry(&options.retry, asset_name, || {
        if if_summary {
            source.readings_summary(asset_name, datapoint, &request.query)
        } else {
            source.readings_timespan(asset_name, datapoint, &request.query)
        }
    })
    .await;

    let table = match res_aggregate {
        Ok(payload) if if_summary => build_summary_table(&payload, asset_name, datapoint),
        Ok(payload) => build_timespan_table(&payload, asset_name, datapoint),
        Err(err) if options.if_fallback_local => {
            warn!(asset = asset_name, error = %err, "aggregate fetch failed, deriving locally");
            package.warn(format!(
                "{} derived from raw readings for {asset_name}: {err}",
                request.mode
            ));
            match fetch_readings(source, request, asset_name, options).await {
                Ok(l_readings) if if_summary => {
                    build_summary_table_from_readings(&l_readings, asset_name, datapoint)
                }
                Ok(l_readings) => {
                    build_timespan_table_from_readings(&l_readings, asset_name, datapoint)
                }
                Err(err) => {
                    package.warn(format!("readings unavailable for {asset_name}: {err}"));
                    SpecTable::no_data()
                }
            }
        }
        Err(err) => {
            warn!(asset = asset_name, error = %err, "aggregate fetch failed");
            package.warn(format!("{} unavailable for {asset_name}: {err}", request.mode));
            if if_summary {
                build_summary_table(&Value::Null, asset_name, datapoint)
            } else {
                build_timespan_table(&Value::Null, asset_name, datapoint)
            }
        }
    };

    let mut layout_options = options.layout.clone();
    layout_options.n_rows_chart_band = 0;
    package.layout = compose_table_layout(&table, &layout_options);
}

async fn build_combined_package(
    source: &dyn ReadingsSource,
    request: &SpecReportRequest,
    options: &SpecReportOptions,
    package: &mut SpecReportPackage,
) -> Result<(), ReportError> {
    let c_url = request.instance_name.as_str();
    let l_assets: Vec<SpecAssetRef> =
        match fetch_with_retry(&options.retry, c_url, || source.assets(c_url)).await {
            Ok(payload) => decode_asset_list(&payload),
            Err(err) => {
                warn!(url = c_url, error = %err, "asset inventory fetch failed");
                package.warn(format!("asset inventory unavailable for {c_url}: {err}"));
                vec![]
            }
        };

    let query = &request.query;
    let policy = &options.retry;
    let if_fallback_local = options.if_fallback_local;
    let report = build_combined_report(&l_assets, move |asset_ref: SpecAssetRef| async move {
        fetch_asset_payload(source, &asset_ref, query, policy, if_fallback_local).await
    })
    .await;

    let mut layout_options = options.layout.clone();
    layout_options.n_rows_chart_band = 0;
    package.layout = compose_combined_layout(&report, &layout_options)?;
    Ok(())
}

/// Build one complete report package for `request`.
///
/// Fetch failures degrade to `NA` cells, sentinel tables and package warnings.
/// Only contract violations are errors: a missing asset for an asset-scoped
/// mode, or a layout whose regions do not tile.
pub async fn build_report_package(
    source: &dyn ReadingsSource,
    request: &SpecReportRequest,
    options: &SpecReportOptions,
) -> Result<SpecReportPackage, ReportError> {
    let mut package = SpecReportPackage::default();

    let c_asset = match request.mode {
        EnumReportMode::Combined => "",
        _ => request
            .asset_name
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(ReportError::MissingArgument("asset_name"))?,
    };

    match request.mode {
        EnumReportMode::Raw => {
            build_raw_package(source, request, c_asset, options, &mut package).await;
        }
        EnumReportMode::Summary | EnumReportMode::Timespan => {
            build_aggregate_package(source, request, c_asset, options, &mut package).await;
        }
        EnumReportMode::Combined => {
            build_combined_package(source, request, options, &mut package).await?;
        }
    }

    package.sheet_name = derive_sheet_name(
        &request.instance_name,
        &derive_report_sheet_suffix(request.mode, c_asset),
        N_LEN_SHEET_NAME_MAX,
    );
    info!(
        sheet = %package.sheet_name,
        mode = %request.mode,
        rows = package.layout.n_rows,
        chart = package.chart.is_some(),
        warnings = package.warnings.len(),
        "built report package"
    );
    Ok(package)
}

/// Build the status package for a set of instances.
pub async fn build_status_package(
    source: &dyn ReadingsSource,
    urls: &[String],
    options: &SpecReportOptions,
) -> SpecReportPackage {
    let policy = &options.retry;
    let table = build_status_report(urls, move |c_url: String| async move {
        fetch_instance_status(source, &c_url, policy).await
    })
    .await;

    let mut package = SpecReportPackage {
        sheet_name: C_SHEET_STATUS.to_string(),
        ..Default::default()
    };
    if urls.is_empty() {
        package.warn("no instances requested");
    }
    let mut layout_options = options.layout.clone();
    layout_options.n_rows_chart_band = 0;
    package.layout = compose_table_layout(&table, &layout_options);

    info!(instances = urls.len(), rows = package.layout.n_rows, "built status package");
    package
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::conf::derive_default_report_options;
    use crate::host::{MemoryGridHost, apply_report_package};
    use crate::spec::EnumTimeUnit;
    use crate::testing::FakeSource;

    const C_URL: &str = "http://edge:8081";

    fn source() -> FakeSource {
        let mut source = FakeSource::default();
        source.readings.insert(
            "sensor".to_string(),
            json!([
                {"timestamp": "2024-01-01 00:00:00.000000", "reading": {"temp": 20.0}},
                {"timestamp": "2024-01-01 00:01:00.000000", "reading": {"temp": 21.0}},
                {"timestamp": "2024-01-01 00:02:00.000000", "reading": {"temp": 22.5}},
            ]),
        );
        source.summaries.insert(
            "pump".to_string(),
            json!({"flow": {"min": 1, "max": 3, "average": 2}}),
        );
        source.timespans.insert(
            "pump".to_string(),
            json!({"oldest": "2024-01-01 00:00:00", "newest": "2024-01-01 01:00:00"}),
        );
        source.assets.insert(
            C_URL.to_string(),
            json!([{"assetCode": "sensor", "count": 3}, {"assetCode": "pump", "count": 9}]),
        );
        source.pings.insert(C_URL.to_string(), json!({"hostName": "edge"}));
        source
    }

    #[tokio::test]
    async fn test_raw_package_has_chart_above_data() {
        let request = SpecReportRequest::new(C_URL, EnumReportMode::Raw).with_asset("sensor");
        let package = build_report_package(&source(), &request, &SpecReportOptions::default())
            .await
            .unwrap();

        assert_eq!(package.sheet_name, "http---edge-8081_sensor");
        assert_eq!(package.layout.row_header, Some(20));
        let chart = package.chart.as_ref().unwrap();
        assert_eq!(chart.major_unit_scale, EnumTimeUnit::Seconds);
        assert_eq!(chart.series_names, vec!["temp".to_string()]);
        assert_eq!(chart.category_region, SpecCellRange::new(21, 0, 23, 0));
        assert!(package.warnings.is_empty());

        let mut host = MemoryGridHost::new();
        apply_report_package(&mut host, &package).unwrap();
    }

    #[tokio::test]
    async fn test_raw_package_without_readings_is_sentinel() {
        let request = SpecReportRequest::new(C_URL, EnumReportMode::Raw).with_asset("ghost");
        let package = build_report_package(&source(), &request, &SpecReportOptions::default())
            .await
            .unwrap();
        assert!(package.chart.is_none());
        assert_eq!(package.layout.cells[0][0], EnumCellValue::from("No Data"));
        assert_eq!(package.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_raw_package_with_single_instant_reserves_no_band() {
        let mut source = source();
        source.readings.insert(
            "burst".to_string(),
            json!([
                {"timestamp": "2024-01-01 00:00:00", "reading": {"temp": 1.0}},
                {"timestamp": "2024-01-01 00:00:00", "reading": {"temp": 2.0}},
            ]),
        );
        let request = SpecReportRequest::new(C_URL, EnumReportMode::Raw).with_asset("burst");
        let package = build_report_package(&source, &request, &SpecReportOptions::default())
            .await
            .unwrap();
        assert!(package.chart.is_none());
        assert!(package.layout.chart_band.is_none());
        assert_eq!(package.layout.row_header, Some(0));
    }

    #[tokio::test]
    async fn test_aggregate_modes_fall_back_to_readings() {
        let request = SpecReportRequest::new(C_URL, EnumReportMode::Summary).with_asset("sensor");
        let package = build_report_package(&source(), &request, &SpecReportOptions::default())
            .await
            .unwrap();
        assert_eq!(package.sheet_name, "http---edge-8081_sensor-Summary");
        assert_eq!(package.layout.cells[1][2], EnumCellValue::Number(20.0));
        assert_eq!(package.warnings.len(), 1);

        let options = SpecReportOptions {
            if_fallback_local: false,
            ..Default::default()
        };
        let request = SpecReportRequest::new(C_URL, EnumReportMode::Timespan).with_asset("sensor");
        let package = build_report_package(&source(), &request, &options).await.unwrap();
        assert_eq!(package.layout.cells[1][2], EnumCellValue::na());

        let request = SpecReportRequest::new(C_URL, EnumReportMode::Timespan).with_asset("pump");
        let package = build_report_package(&source(), &request, &options).await.unwrap();
        assert_eq!(package.layout.column_formats.len(), 2);
        assert!(package.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_summary_package_for_one_datapoint() {
        let request = SpecReportRequest::new(C_URL, EnumReportMode::Summary)
            .with_asset("pump")
            .with_datapoint("flow");
        let package = build_report_package(&source(), &request, &derive_default_report_options())
            .await
            .unwrap();
        assert_eq!(package.sheet_name, "http---edge-8081_pump-Summary");
        assert_eq!(package.layout.cells[1][1], EnumCellValue::from("flow"));
        assert_eq!(package.layout.cells[1][4], EnumCellValue::Number(2.0));
        assert!(package.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_combined_package_and_missing_asset() {
        let request = SpecReportRequest::new(C_URL, EnumReportMode::Combined);
        let package = build_report_package(&source(), &request, &SpecReportOptions::default())
            .await
            .unwrap();
        assert_eq!(package.sheet_name, "http---edge-8081_Combined");
        assert_eq!(package.layout.cells[2][1], EnumCellValue::from("sensor"));
        assert_eq!(package.layout.cells[3][2], EnumCellValue::Number(9.0));

        let mut host = MemoryGridHost::new();
        apply_report_package(&mut host, &package).unwrap();

        let request = SpecReportRequest::new(C_URL, EnumReportMode::Raw);
        assert_eq!(
            build_report_package(&source(), &request, &SpecReportOptions::default()).await,
            Err(ReportError::MissingArgument("asset_name"))
        );
    }

    #[tokio::test]
    async fn test_status_package_marks_unreachable_instance() {
        let l_urls = vec![C_URL.to_string(), "http://down".to_string()];
        let package = build_status_package(&source(), &l_urls, &SpecReportOptions::default()).await;
        assert_eq!(package.sheet_name, "Status");
        assert_eq!(package.layout.cells[1][1], EnumCellValue::from("edge"));
        assert_eq!(package.layout.cells[1][2], EnumCellValue::na());
    }
}
