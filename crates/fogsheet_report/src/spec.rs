//! Shared report models, options and errors.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::conf::{
    C_NA, N_BACKOFF_FACTOR, N_MS_BACKOFF_BASE, N_MS_BACKOFF_MAX, N_RETRY_ATTEMPTS_MAX,
    N_ROWS_CHART_BAND, derive_default_report_formats,
};

////////////////////////////////////////////////////////////////////////////////
// #region CellValues

/// Primitive value placed into one output cell.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Text value. The empty string is a blank cell.
    String(String),
    /// Numeric value (including `GridDate` serials).
    Number(f64),
    /// Boolean value.
    Boolean(bool),
}

impl EnumCellValue {
    /// Blank cell.
    pub fn empty() -> Self {
        Self::String(String::new())
    }

    /// Explicit "data unavailable" marker.
    pub fn na() -> Self {
        Self::String(C_NA.to_string())
    }

    /// `true` for the blank cell.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::String(s) if s.is_empty())
    }
}

impl From<&str> for EnumCellValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for EnumCellValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for EnumCellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for EnumCellValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for EnumCellValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for EnumCellValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<GridDate> for EnumCellValue {
    fn from(value: GridDate) -> Self {
        Self::Number(value.value())
    }
}

/// Heterogeneous input cell accepted by the row normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumRawCell {
    /// Missing value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Numeric value, possibly non-finite.
    Number(f64),
    /// Text value of any length.
    String(String),
    /// Date-like value, converted to a `GridDate` serial.
    DateTime(DateTime<Utc>),
    /// Any other structured value, rendered as JSON text.
    Json(Value),
}

impl From<&Value> for EnumRawCell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(*b),
            Value::Number(n) => n.as_f64().map_or_else(|| Self::Json(value.clone()), Self::Number),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::Json(value.clone()),
        }
    }
}

impl From<EnumCellValue> for EnumRawCell {
    fn from(value: EnumCellValue) -> Self {
        match value {
            EnumCellValue::String(s) => Self::String(s),
            EnumCellValue::Number(n) => Self::Number(n),
            EnumCellValue::Boolean(b) => Self::Boolean(b),
        }
    }
}

impl From<&str> for EnumRawCell {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<f64> for EnumRawCell {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Rectangular table of headers and primitive cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecTable {
    /// Column headers.
    pub headers: Vec<String>,
    /// Body rows; each row has `headers.len()` cells.
    pub rows: Vec<Vec<EnumCellValue>>,
}

impl SpecTable {
    /// Build a table from headers and rows as given.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<EnumCellValue>>) -> Self {
        Self { headers, rows }
    }

    /// The `No Data` sentinel returned for empty inputs.
    pub fn no_data() -> Self {
        Self {
            headers: vec!["No Data".to_string()],
            rows: vec![vec![EnumCellValue::from("No readings found")]],
        }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Number of body rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// `true` when every row matches the header width.
    pub fn is_rectangular(&self) -> bool {
        self.rows.iter().all(|row| row.len() == self.headers.len())
    }

    /// `true` for the `No Data` sentinel.
    pub fn is_no_data(&self) -> bool {
        *self == Self::no_data()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReadingRecords

/// Canonical numeric day-count timestamp.
///
/// Integer part counts days since 1899-12-30, fractional part is the time of day.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct GridDate(pub f64);

impl GridDate {
    /// Serial value.
    pub fn value(self) -> f64 {
        self.0
    }
}

/// Wire timestamp as received from upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumRawTimestamp {
    /// FogLAMP (`YYYY-MM-DD HH:MM:SS.ffffff`) or ISO-8601 text.
    Text(String),
    /// Epoch number of ambiguous unit, or a serial date.
    Number(f64),
    /// No timestamp present.
    Missing,
}

impl From<&Value> for EnumRawTimestamp {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s.clone()),
            Value::Number(n) => n.as_f64().map_or(Self::Missing, Self::Number),
            _ => Self::Missing,
        }
    }
}

impl From<&str> for EnumRawTimestamp {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One datapoint value within a reading.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumReadingValue {
    /// Numeric datapoint.
    Number(f64),
    /// Non-numeric datapoint.
    Text(String),
}

impl EnumReadingValue {
    /// Decode from JSON; `null` yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Bool(b) => Some(Self::Text(b.to_string())),
            Value::Array(_) | Value::Object(_) => Some(Self::Text(value.to_string())),
        }
    }

    /// Numeric view; numeric strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Raw cell for the normalizer.
    pub fn to_raw_cell(&self) -> EnumRawCell {
        match self {
            Self::Number(n) => EnumRawCell::Number(*n),
            Self::Text(s) => EnumRawCell::String(s.clone()),
        }
    }
}

impl From<f64> for EnumReadingValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// One timestamped observation of one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecReadingRecord {
    /// Raw timestamp as received.
    pub timestamp: EnumRawTimestamp,
    /// Owning asset.
    pub asset_name: String,
    /// Datapoint values keyed by datapoint name.
    pub values: BTreeMap<String, EnumReadingValue>,
}

impl SpecReadingRecord {
    /// Build a record from parts.
    pub fn new(
        timestamp: EnumRawTimestamp,
        asset_name: impl Into<String>,
        values: BTreeMap<String, EnumReadingValue>,
    ) -> Self {
        Self {
            timestamp,
            asset_name: asset_name.into(),
            values,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region AggregateModels

/// Min/max/average of one datapoint. `None` renders as `NA`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpecDatapointStats {
    /// Minimum value.
    pub min: Option<f64>,
    /// Maximum value.
    pub max: Option<f64>,
    /// Arithmetic mean.
    pub average: Option<f64>,
}

/// Per-asset view model for one combined report build.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecAssetSummaryEntry {
    /// Asset identifier.
    pub asset_name: String,
    /// Reading count, when known.
    pub reading_count: Option<u64>,
    /// Oldest reading timestamp.
    pub oldest: Option<GridDate>,
    /// Newest reading timestamp.
    pub newest: Option<GridDate>,
    /// Statistics per datapoint.
    pub datapoint_stats: BTreeMap<String, SpecDatapointStats>,
}

/// Asset listed by an instance inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAssetRef {
    /// Asset identifier.
    pub asset_name: String,
    /// Reading count reported by the inventory.
    pub reading_count: Option<u64>,
}

impl From<&str> for SpecAssetRef {
    fn from(value: &str) -> Self {
        Self {
            asset_name: value.to_string(),
            reading_count: None,
        }
    }
}

impl From<String> for SpecAssetRef {
    fn from(value: String) -> Self {
        Self {
            asset_name: value,
            reading_count: None,
        }
    }
}

/// Aggregate payloads fetched for one asset.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecAssetPayload {
    /// Timespan payload (oldest/newest), any upstream shape.
    pub timespan: Value,
    /// Summary payload (min/max/average), any upstream shape.
    pub summary: Value,
    /// Reading count when the fetch path knows it.
    pub reading_count: Option<u64>,
}

/// Status payloads fetched for one instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecInstanceStatusPayload {
    /// Ping payload.
    pub ping: Value,
    /// Statistics payload.
    pub statistics: Value,
    /// Asset inventory payload.
    pub assets: Value,
}

/// Combined multi-asset block with region markers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecCombinedReport {
    /// First row of the block (title band).
    pub headers: Vec<String>,
    /// Remaining rows of the block.
    pub rows: Vec<Vec<EnumCellValue>>,
    /// Regions relative to the block, where row 0 is `headers`.
    pub regions: Vec<SpecGridRegion>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellFormat

/// Declarative cell style directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridModels

/// Structural role of a grid region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumRegionKind {
    /// Title or row-label band.
    Label,
    /// Column header row.
    Header,
    /// Data cells.
    Value,
    /// Blank filler (separator rows, padding, chart band).
    Spacer,
}

impl EnumRegionKind {
    /// Preset key used to look up the default style.
    pub fn format_key(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Header => "header",
            Self::Value => "value",
            Self::Spacer => "spacer",
        }
    }
}

/// Inclusive rectangular cell range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecCellRange {
    /// First row (inclusive).
    pub row_start: usize,
    /// First column (inclusive).
    pub col_start: usize,
    /// Last row (inclusive).
    pub row_end: usize,
    /// Last column (inclusive).
    pub col_end: usize,
}

impl SpecCellRange {
    /// Build a range from inclusive corners.
    pub fn new(row_start: usize, col_start: usize, row_end: usize, col_end: usize) -> Self {
        Self {
            row_start,
            col_start,
            row_end,
            col_end,
        }
    }

    /// Number of rows covered.
    pub fn height(&self) -> usize {
        self.row_end + 1 - self.row_start
    }

    /// Number of columns covered.
    pub fn width(&self) -> usize {
        self.col_end + 1 - self.col_start
    }

    /// `true` when `(row, col)` lies inside the range.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row_start && row <= self.row_end && col >= self.col_start && col <= self.col_end
    }

    /// `true` when the two ranges share at least one row.
    pub fn intersects_rows(&self, other: &SpecCellRange) -> bool {
        self.row_start <= other.row_end && other.row_start <= self.row_end
    }
}

/// Non-overlapping rectangular sub-area carrying a style/merge intent.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecGridRegion {
    /// First row.
    pub row_start: usize,
    /// First column.
    pub col_start: usize,
    /// Number of rows (>= 1).
    pub row_span: usize,
    /// Number of columns (>= 1).
    pub col_span: usize,
    /// Structural role.
    pub kind: EnumRegionKind,
    /// Merge the region into one cell.
    pub if_merge: bool,
    /// Style directive; `None` falls back to the preset for `kind`.
    pub style: Option<SpecCellFormat>,
}

impl SpecGridRegion {
    /// Unstyled, unmerged region.
    pub fn new(
        row_start: usize,
        col_start: usize,
        row_span: usize,
        col_span: usize,
        kind: EnumRegionKind,
    ) -> Self {
        Self {
            row_start,
            col_start,
            row_span,
            col_span,
            kind,
            if_merge: false,
            style: None,
        }
    }

    /// Mark the region as merged.
    pub fn merged(mut self) -> Self {
        self.if_merge = true;
        self
    }

    /// Attach a style directive.
    pub fn styled(mut self, style: SpecCellFormat) -> Self {
        self.style = Some(style);
        self
    }

    /// Translate by `(rows, cols)`.
    pub fn shifted(&self, rows: usize, cols: usize) -> Self {
        Self {
            row_start: self.row_start + rows,
            col_start: self.col_start + cols,
            ..self.clone()
        }
    }

    /// Covered cells as an inclusive range.
    pub fn to_range(&self) -> SpecCellRange {
        SpecCellRange::new(
            self.row_start,
            self.col_start,
            self.row_start + self.row_span.saturating_sub(1),
            self.col_start + self.col_span.saturating_sub(1),
        )
    }
}

/// Number format applied to a column segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecColumnFormat {
    /// Absolute column.
    pub col: usize,
    /// First row (inclusive).
    pub row_start: usize,
    /// Last row (inclusive).
    pub row_end: usize,
    /// Host number-format code.
    pub num_format: String,
}

/// Absolute placement of one report block plus its style directives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecGridLayout {
    /// Absolute row of the top-left corner.
    pub row_origin: usize,
    /// Absolute column of the top-left corner.
    pub col_origin: usize,
    /// Rows in the written rectangle.
    pub n_rows: usize,
    /// Columns in the written rectangle.
    pub n_cols: usize,
    /// Absolute row of the column-header row, if the block has one.
    pub row_header: Option<usize>,
    /// Absolute row of the first data row.
    pub row_data_start: usize,
    /// Cell values of the whole rectangle, row-major.
    pub cells: Vec<Vec<EnumCellValue>>,
    /// Regions tiling the rectangle (absolute coordinates).
    pub regions: Vec<SpecGridRegion>,
    /// Number formats per column segment.
    pub column_formats: Vec<SpecColumnFormat>,
    /// Column widths as `(absolute column, width)`.
    pub column_widths: Vec<(usize, f64)>,
    /// Band reserved for a chart, if any.
    ///
    /// Its rows are the spacer rows above the header. Its columns start at the
    /// block origin and may run right of the written rectangle; no cells are
    /// written there, so the chart floats over empty cells.
    pub chart_band: Option<SpecCellRange>,
}

impl SpecGridLayout {
    /// The written rectangle in absolute coordinates.
    pub fn written_range(&self) -> SpecCellRange {
        SpecCellRange::new(
            self.row_origin,
            self.col_origin,
            self.row_origin + self.n_rows.saturating_sub(1),
            self.col_origin + self.n_cols.saturating_sub(1),
        )
    }

    /// Regions flagged for merging.
    pub fn merges(&self) -> impl Iterator<Item = &SpecGridRegion> {
        self.regions.iter().filter(|region| region.if_merge)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ChartModels

/// Category-axis time granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumTimeUnit {
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
}

impl EnumTimeUnit {
    /// Length of one unit in seconds.
    pub fn seconds(self) -> f64 {
        match self {
            Self::Seconds => 1.0,
            Self::Minutes => 60.0,
            Self::Hours => 3_600.0,
            Self::Days => 86_400.0,
        }
    }
}

impl fmt::Display for EnumTimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c_name = match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
            Self::Hours => "hours",
            Self::Days => "days",
        };
        write!(f, "{c_name}")
    }
}

/// Legend placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumLegendPosition {
    /// Right of the plot area.
    Right,
    /// Below the plot area.
    #[default]
    Bottom,
    /// Above the plot area.
    Top,
    /// Left of the plot area.
    Left,
    /// No legend.
    None,
}

/// Host-independent line chart descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecChart {
    /// Value columns; one series per column.
    pub series_region: SpecCellRange,
    /// Series display names, one per column of `series_region`.
    pub series_names: Vec<String>,
    /// Category (time) column.
    pub category_region: SpecCellRange,
    /// Category label format code.
    pub category_format: String,
    /// Major tick step, expressed in `major_unit_scale`.
    pub major_unit: f64,
    /// Unit of `major_unit`.
    pub major_unit_scale: EnumTimeUnit,
    /// Axis minimum, pinned to the earliest point.
    pub axis_min: GridDate,
    /// Axis maximum, pinned to the latest point.
    pub axis_max: GridDate,
    /// Legend placement.
    pub legend_position: EnumLegendPosition,
    /// Top-left anchor cell `(row, col)`.
    pub anchor_start: (usize, usize),
    /// Bottom-right anchor cell `(row, col)`.
    pub anchor_end: (usize, usize),
}

impl SpecChart {
    /// Major tick step in days, for hosts with day-based date axes.
    pub fn major_unit_days(&self) -> f64 {
        self.major_unit * self.major_unit_scale.seconds() / 86_400.0
    }
}

/// Final immutable package handed to a grid host.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecReportPackage {
    /// Host-safe output identifier.
    pub sheet_name: String,
    /// Placed cells and style directives.
    pub layout: SpecGridLayout,
    /// Optional chart descriptor.
    pub chart: Option<SpecChart>,
    /// Non-fatal degradation notes.
    pub warnings: Vec<String>,
}

impl SpecReportPackage {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Options

/// Timestamp label style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumDateStyle {
    /// `MM/DD/YYYY hh:mm:ss AM`.
    DateTime,
    /// `MM/DD/YYYY`.
    Date,
    /// `hh:mm:ss AM`.
    Time,
}

/// Report mode selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumReportMode {
    /// One row per reading.
    Raw,
    /// Min/max/average per datapoint.
    Summary,
    /// Oldest/newest timestamps.
    Timespan,
    /// All assets of one instance.
    Combined,
}

impl fmt::Display for EnumReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c_name = match self {
            Self::Raw => "Raw",
            Self::Summary => "Summary",
            Self::Timespan => "Timespan",
            Self::Combined => "Combined",
        };
        write!(f, "{c_name}")
    }
}

/// Reading window parameters, validated by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SpecReadingsQuery {
    /// Maximum number of readings.
    pub limit: Option<u64>,
    /// Readings to skip.
    pub skip: Option<u64>,
    /// Window length in seconds.
    pub seconds: Option<u64>,
    /// Window length in minutes.
    pub minutes: Option<u64>,
    /// Window length in hours.
    pub hours: Option<u64>,
    /// Shift the window back by this many window lengths.
    pub previous: Option<u64>,
}

/// One report invocation. Identifiers are explicit; nothing is ambient.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SpecReportRequest {
    /// Instance URL; also the left part of the sheet name.
    pub instance_name: String,
    /// Report mode.
    pub mode: EnumReportMode,
    /// Asset for raw, summary and timespan modes.
    #[serde(default)]
    pub asset_name: Option<String>,
    /// Restrict to one datapoint.
    #[serde(default)]
    pub datapoint: Option<String>,
    /// Reading window.
    #[serde(default)]
    pub query: SpecReadingsQuery,
}

impl SpecReportRequest {
    /// Request for `mode` on `instance_name` with no asset selected.
    pub fn new(instance_name: impl Into<String>, mode: EnumReportMode) -> Self {
        Self {
            instance_name: instance_name.into(),
            mode,
            asset_name: None,
            datapoint: None,
            query: SpecReadingsQuery::default(),
        }
    }

    /// Select an asset.
    pub fn with_asset(mut self, asset_name: impl Into<String>) -> Self {
        self.asset_name = Some(asset_name.into());
        self
    }

    /// Select a datapoint.
    pub fn with_datapoint(mut self, datapoint: impl Into<String>) -> Self {
        self.datapoint = Some(datapoint.into());
        self
    }
}

/// Autofit rule for column width inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnumAutofitColumnsRule {
    /// Disable autofit.
    None,
    /// Infer width from header cells only.
    Header,
    /// Infer width from body cells only.
    Body,
    /// Infer width from both header and body cells (default).
    #[default]
    All,
}

/// Autofit policy for column widths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpecAutofitCellsPolicy {
    /// Autofit width inference rule.
    pub rule_columns: EnumAutofitColumnsRule,
    /// Max body rows inspected when body-based inference is active.
    pub height_body_inferred_max: Option<usize>,
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            rule_columns: EnumAutofitColumnsRule::All,
            height_body_inferred_max: Some(2_000),
            width_cell_min: 8,
            width_cell_max: 60,
            width_cell_padding: 2,
        }
    }
}

/// Placement options for the grid layout composer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpecLayoutOptions {
    /// Absolute row of the block's top-left corner.
    pub row_origin: usize,
    /// Absolute column of the block's top-left corner.
    pub col_origin: usize,
    /// Rows reserved above the table for a chart (0 disables the band).
    pub n_rows_chart_band: usize,
    /// Column width policy.
    pub policy_autofit: SpecAutofitCellsPolicy,
    /// Style presets keyed by region kind (`label`, `header`, ...) and `datetime`.
    pub formats: BTreeMap<String, SpecCellFormat>,
}

impl Default for SpecLayoutOptions {
    fn default() -> Self {
        Self {
            row_origin: 0,
            col_origin: 0,
            n_rows_chart_band: 0,
            policy_autofit: SpecAutofitCellsPolicy::default(),
            formats: derive_default_report_formats(),
        }
    }
}

/// Bounded retry policy for fetch calls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpecRetryPolicy {
    /// Total attempts including the first one.
    pub n_attempts_max: u32,
    /// Delay before the first retry.
    pub ms_backoff_base: u64,
    /// Delay ceiling.
    pub ms_backoff_max: u64,
    /// Multiplier applied per retry.
    pub backoff_factor: f64,
}

impl Default for SpecRetryPolicy {
    fn default() -> Self {
        Self {
            n_attempts_max: N_RETRY_ATTEMPTS_MAX,
            ms_backoff_base: N_MS_BACKOFF_BASE,
            ms_backoff_max: N_MS_BACKOFF_MAX,
            backoff_factor: N_BACKOFF_FACTOR,
        }
    }
}

/// Report-wide options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpecReportOptions {
    /// Layout options; `n_rows_chart_band` is set per mode when charts are on.
    pub layout: SpecLayoutOptions,
    /// Fetch retry policy.
    pub retry: SpecRetryPolicy,
    /// Emit a chart for raw reports.
    pub if_include_chart: bool,
    /// Derive aggregates from raw readings when aggregate endpoints fail.
    pub if_fallback_local: bool,
    /// Legend placement for charts.
    pub legend_position: EnumLegendPosition,
}

impl Default for SpecReportOptions {
    fn default() -> Self {
        Self {
            layout: SpecLayoutOptions::default(),
            retry: SpecRetryPolicy::default(),
            if_include_chart: true,
            if_fallback_local: true,
            legend_position: EnumLegendPosition::Bottom,
        }
    }
}

impl SpecReportOptions {
    /// Rows reserved for the chart band when charts are enabled.
    pub fn n_rows_chart_band(&self) -> usize {
        if self.if_include_chart {
            usize::max(self.layout.n_rows_chart_band, N_ROWS_CHART_BAND)
        } else {
            0
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Failure reported by the injected fetch capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Connection-level failure.
    #[error("transport failure for {target}: {message}")]
    Transport {
        /// Requested resource.
        target: String,
        /// Underlying error text.
        message: String,
    },
    /// Non-success HTTP status.
    #[error("upstream returned HTTP {status} for {target}")]
    Status {
        /// Requested resource.
        target: String,
        /// HTTP status code.
        status: u16,
    },
    /// Capability-side timeout.
    #[error("timed out fetching {0}")]
    Timeout(String),
    /// Payload could not be decoded at all.
    #[error("invalid payload from {target}: {message}")]
    InvalidPayload {
        /// Requested resource.
        target: String,
        /// Decoder error text.
        message: String,
    },
    /// The capability does not provide this endpoint.
    #[error("fetch capability not available: {0}")]
    Unsupported(String),
}

impl FetchError {
    /// `true` when retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidPayload { .. } | Self::Unsupported(_) => false,
        }
    }
}

/// Programmer-contract violations. Data-shape problems never produce these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    /// Two regions cover the same cell.
    #[error("grid regions overlap at row {row}, column {col}")]
    RegionOverlap {
        /// Absolute row.
        row: usize,
        /// Absolute column.
        col: usize,
    },
    /// A cell of the written rectangle is not covered by any region.
    #[error("grid regions leave row {row}, column {col} uncovered")]
    RegionGap {
        /// Absolute row.
        row: usize,
        /// Absolute column.
        col: usize,
    },
    /// A region extends outside the written rectangle.
    #[error("grid region at row {row}, column {col} exceeds the written rectangle")]
    RegionOutOfBounds {
        /// Absolute row of the region start.
        row: usize,
        /// Absolute column of the region start.
        col: usize,
    },
    /// Chart anchors overlap data rows.
    #[error("chart anchor rows {anchor_row_start}..={anchor_row_end} overlap data rows")]
    ChartAnchorOverlap {
        /// First anchor row.
        anchor_row_start: usize,
        /// Last anchor row.
        anchor_row_end: usize,
    },
    /// Chart anchor lies outside the reserved chart band.
    #[error("chart anchor at row {row}, column {col} is outside the chart band")]
    ChartAnchorOutsideBand {
        /// Offending anchor row.
        row: usize,
        /// Offending anchor column.
        col: usize,
    },
    /// Required argument missing for the selected mode.
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),
    /// Grid host rejected a write.
    #[error("grid host write failed: {0}")]
    Host(String),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
