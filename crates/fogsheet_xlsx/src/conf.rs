//! XLSX host constants.

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Approximate pixel width of one default column, used to size charts.
pub const N_PX_CHART_COL: usize = 64;
/// Pixel height of one default row, used to size charts.
pub const N_PX_CHART_ROW: usize = 20;
