//! Report constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{SpecCellFormat, SpecReportOptions};

/// Marker for data that could not be obtained.
pub const C_NA: &str = "NA";

/// Bullet opening each line of a list cell.
pub const C_LIST_BULLET: &str = "• ";
/// Literal-text marker placed before a list cell's first bullet.
pub const C_LIST_TEXT_PREFIX: char = '\'';

/// Host per-cell text ceiling (characters).
pub const N_LEN_CELL_TEXT_MAX: usize = 30_000;
/// Visible suffix appended to truncated cell text.
pub const C_TRUNCATION_SUFFIX: &str = "... [Data truncated]";

/// Host sheet name maximum length.
pub const N_LEN_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_SHEET_NAME_ILLEGAL: [char; 7] = ['\\', '/', '?', '*', '[', ']', ':'];
/// Replacement for illegal sheet name characters.
pub const C_SHEET_NAME_REPLACEMENT: char = '-';
/// Separator between the two parts of a derived sheet name.
pub const C_SHEET_NAME_SEPARATOR: char = '_';

/// Days between the grid epoch (1899-12-30) and the Unix epoch.
pub const N_GRID_DATE_UNIX_OFFSET_DAYS: f64 = 25_569.0;
/// Milliseconds per day.
pub const N_MS_PER_DAY: f64 = 86_400_000.0;
/// Upper bound (exclusive) for numbers treated as grid serials.
pub const N_GRID_DATE_SERIAL_MAX: f64 = 100_000.0;
/// Epoch numbers above this are microseconds.
pub const N_EPOCH_MICROS_MIN: f64 = 1e14;
/// Epoch numbers above this (up to micros) are milliseconds.
pub const N_EPOCH_MILLIS_MIN: f64 = 1e12;
/// Epoch numbers above this (up to millis) are seconds.
pub const N_EPOCH_SECONDS_MIN: f64 = 1e9;

/// Chart span ceilings (seconds) per axis unit, inclusive.
pub const N_SECS_AXIS_SECONDS_MAX: f64 = 300.0;
pub const N_SECS_AXIS_MINUTES_MAX: f64 = 7_200.0;
pub const N_SECS_AXIS_HOURS_MAX: f64 = 172_800.0;
/// Target number of major ticks on the time axis.
pub const N_AXIS_TICKS_TARGET: f64 = 8.0;
/// Rows reserved above a table for the chart.
pub const N_ROWS_CHART_BAND: usize = 20;
/// Columns spanned by the chart anchor.
pub const N_COLS_CHART_WIDTH: usize = 10;

/// Host number format for `GridDate` columns.
pub const C_NUM_FORMAT_DATETIME: &str = "mm/dd/yyyy hh:mm:ss AM/PM";

/// Ping fields in status reports, as `(payload key, row label)`.
pub const TUP_STATUS_PING_FIELDS: [(&str, &str); 12] = [
    ("hostName", "Hostname"),
    ("serviceName", "Service Name"),
    ("version", "Version"),
    ("health", "Health"),
    ("uptime", "Uptime (s)"),
    ("dataRead", "Data Read"),
    ("dataSent", "Data Sent"),
    ("dataPurged", "Data Purged"),
    ("authenticationOptional", "Authentication Optional"),
    ("safeMode", "Safe Mode"),
    ("ipAddresses", "IP Addresses"),
    ("alerts", "Alerts"),
];

/// Statistics keys in status reports.
pub const TUP_STATUS_STATISTICS_KEYS: [&str; 6] = [
    "READINGS",
    "BUFFERED",
    "DISCARDED",
    "UNSENT",
    "PURGED",
    "UNSNPURGED",
];

/// Default total fetch attempts.
pub const N_RETRY_ATTEMPTS_MAX: u32 = 3;
/// Default first retry delay.
pub const N_MS_BACKOFF_BASE: u64 = 500;
/// Default retry delay ceiling.
pub const N_MS_BACKOFF_MAX: u64 = 8_000;
/// Default retry delay multiplier.
pub const N_BACKOFF_FACTOR: f64 = 2.0;

/// Build default style presets keyed by region kind plus `datetime`.
pub fn derive_default_report_formats() -> BTreeMap<String, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        font_name: Some("Calibri".to_string()),
        font_size: Some(11),
        border: Some(1),
        align: Some("left".to_string()),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert("value".to_string(), cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        "label".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            bg_color: Some("#D9E1F2".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "header".to_string(),
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            bg_color: Some("#4472C4".to_string()),
            font_color: Some("#FFFFFF".to_string()),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        "spacer".to_string(),
        SpecCellFormat {
            border: Some(0),
            ..Default::default()
        },
    );
    dict_fmt.insert(
        "datetime".to_string(),
        SpecCellFormat {
            num_format: Some(C_NUM_FORMAT_DATETIME.to_string()),
            ..Default::default()
        },
    );

    dict_fmt
}

/// Build default report options.
pub fn derive_default_report_options() -> SpecReportOptions {
    SpecReportOptions::default()
}
