//! Buffered sheet state and adapter errors.

use std::collections::BTreeMap;

use fogsheet_report::{EnumCellValue, ReportError, SpecCellFormat, SpecCellRange, SpecChart};
use rust_xlsxwriter::XlsxError;

////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Failure inside the xlsx adapter.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Underlying writer error.
    #[error("xlsx write error: {0}")]
    Xlsx(#[from] XlsxError),
    /// Row beyond the worksheet limit.
    #[error("row index overflow: {0}")]
    RowOverflow(usize),
    /// Column beyond the worksheet limit.
    #[error("column index overflow: {0}")]
    ColOverflow(usize),
    /// Merge range collides with an earlier merge.
    #[error("merge at row {row}, column {col} overlaps an existing merge")]
    MergeOverlap {
        /// First row of the rejected merge.
        row: usize,
        /// First column of the rejected merge.
        col: usize,
    },
    /// Write attempted after the session was closed.
    #[error("xlsx session already closed")]
    Closed,
}

impl From<HostError> for ReportError {
    fn from(err: HostError) -> Self {
        ReportError::Host(err.to_string())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetBuffer

/// Everything written to one sheet, held until the workbook is rendered.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecXlsxSheetBuffer {
    /// Cell values keyed by `(row, col)`.
    pub cells: BTreeMap<(usize, usize), EnumCellValue>,
    /// Resolved cell formats keyed by `(row, col)`.
    pub formats: BTreeMap<(usize, usize), SpecCellFormat>,
    /// Merged ranges.
    pub merges: Vec<SpecCellRange>,
    /// Column widths.
    pub column_widths: BTreeMap<usize, f64>,
    /// Charts to insert.
    pub charts: Vec<SpecChart>,
}

impl SpecXlsxSheetBuffer {
    /// Merge range that covers `(row, col)`, if any.
    pub fn find_merge(&self, row: usize, col: usize) -> Option<&SpecCellRange> {
        self.merges.iter().find(|range| range.contains(row, col))
    }
}

/// Per-sheet summary of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecXlsxSheetReport {
    /// Final worksheet name.
    pub sheet_name: String,
    /// Cells buffered.
    pub n_cells: usize,
    /// Merged ranges.
    pub n_merges: usize,
    /// Charts.
    pub n_charts: usize,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
