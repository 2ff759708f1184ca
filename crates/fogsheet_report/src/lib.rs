//! `fogsheet_report` v1:
//! Sensor report engine that turns FogLAMP readings into grid report packages.
//!
//! Modules, leaf first:
//! - `conf`      : constants and default presets
//! - `spec`      : models, options and errors
//! - `timeval`   : wire timestamps to grid date serials
//! - `normalize` : rectangular primitive cells
//! - `util`      : sheet naming and width estimation
//! - `reading`   : raw readings tables
//! - `summary`   : summary/timespan tables and local aggregates
//! - `combined`  : multi-asset combined block
//! - `status`    : field-by-instance status matrix
//! - `layout`    : absolute placement, regions and autofit
//! - `chart`     : adaptive time-axis chart descriptors
//! - `fetch`     : injected fetch capability and bounded retry
//! - `host`      : grid host seam and in-memory host
//! - `report`    : end-to-end package builders
pub mod chart;
pub mod combined;
pub mod conf;
pub mod fetch;
pub mod host;
pub mod layout;
pub mod normalize;
pub mod reading;
pub mod report;
pub mod spec;
pub mod status;
pub mod summary;
pub mod timeval;
pub mod util;

#[cfg(test)]
mod testing;

pub use chart::{build_chart_spec, derive_axis_span, nice_step, select_time_unit};
pub use combined::build_combined_report;
pub use conf::{
    C_NA, N_LEN_CELL_TEXT_MAX, N_LEN_SHEET_NAME_MAX, TUP_SHEET_NAME_ILLEGAL,
    derive_default_report_formats, derive_default_report_options,
};
pub use fetch::{
    ReadingsSource, calculate_backoff, decode_asset_list, fetch_asset_payload,
    fetch_instance_status, fetch_with_retry,
};
pub use host::{GridHost, MemoryGridHost, apply_report_package};
pub use layout::{compose_combined_layout, compose_table_layout, validate_region_tiling};
pub use normalize::{calculate_target_cols, normalize_rows, normalize_table};
pub use reading::{build_raw_table, decode_readings};
pub use report::{build_report_package, build_status_package};
pub use spec::{
    EnumCellValue, EnumLegendPosition, EnumRawCell, EnumRawTimestamp, EnumReadingValue,
    EnumRegionKind, EnumReportMode, EnumTimeUnit, FetchError, GridDate, ReportError,
    SpecAssetPayload, SpecAssetRef, SpecCellFormat, SpecCellRange, SpecChart,
    SpecCombinedReport, SpecGridLayout, SpecGridRegion, SpecInstanceStatusPayload,
    SpecLayoutOptions, SpecReadingRecord, SpecReadingsQuery, SpecReportOptions,
    SpecReportPackage, SpecReportRequest, SpecRetryPolicy, SpecTable,
};
pub use status::build_status_report;
pub use summary::{build_summary_table, build_timespan_table, derive_local_aggregate};
pub use timeval::{format_grid_date, from_grid_date, to_grid_date};
pub use util::derive_sheet_name;
