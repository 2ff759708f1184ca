//! Grid host seam and the package applier.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use crate::chart::{validate_chart_anchor, validate_chart_band};
use crate::layout::validate_region_tiling;
use crate::spec::{
    EnumCellValue, ReportError, SpecCellFormat, SpecCellRange, SpecChart, SpecColumnFormat,
    SpecReportPackage,
};

/// Spreadsheet-like sink for report packages.
///
/// Coordinates are absolute and zero-based. Implementations own partial-write
/// handling; the engine only ever hands over complete packages.
pub trait GridHost {
    /// Drop everything previously written to `sheet_name`.
    fn clear_block(&mut self, sheet_name: &str) -> Result<(), ReportError>;

    /// Write a rectangular block with its top-left cell at `(row, col)`.
    fn write_block(
        &mut self,
        sheet_name: &str,
        row: usize,
        col: usize,
        cells: &[Vec<EnumCellValue>],
    ) -> Result<(), ReportError>;

    /// Apply a number format to a column segment.
    fn set_column_format(
        &mut self,
        sheet_name: &str,
        column_format: &SpecColumnFormat,
    ) -> Result<(), ReportError>;

    /// Merge a range, keeping `value` as the merged cell content.
    fn merge_region(
        &mut self,
        sheet_name: &str,
        range: &SpecCellRange,
        value: &EnumCellValue,
    ) -> Result<(), ReportError>;

    /// Apply a style to every cell of a range.
    fn style_region(
        &mut self,
        sheet_name: &str,
        range: &SpecCellRange,
        style: &SpecCellFormat,
    ) -> Result<(), ReportError>;

    /// Set one column width in character units.
    fn set_column_width(&mut self, sheet_name: &str, col: usize, width: f64)
    -> Result<(), ReportError>;

    /// Create a line chart.
    fn insert_chart(&mut self, sheet_name: &str, chart: &SpecChart) -> Result<(), ReportError>;
}

/// Check the package contract, then clear and rewrite its sheet.
///
/// Re-applying the same package leaves the host in the same state.
pub fn apply_report_package<H: GridHost + ?Sized>(
    host: &mut H,
    package: &SpecReportPackage,
) -> Result<(), ReportError> {
    let layout = &package.layout;
    let c_sheet = package.sheet_name.as_str();
    let range_written = layout.written_range();

    validate_region_tiling(&layout.regions, &range_written)?;
    if let Some(chart) = &package.chart {
        let row_first_data = layout.row_header.unwrap_or(layout.row_data_start);
        let range_data = SpecCellRange::new(
            row_first_data,
            range_written.col_start,
            usize::max(row_first_data, range_written.row_end),
            range_written.col_end,
        );
        validate_chart_anchor(chart, &range_data)?;
        validate_chart_band(chart, layout.chart_band.as_ref())?;
    }

    host.clear_block(c_sheet)?;
    host.write_block(c_sheet, layout.row_origin, layout.col_origin, &layout.cells)?;

    for region in &layout.regions {
        if let Some(style) = &region.style {
            host.style_region(c_sheet, &region.to_range(), style)?;
        }
    }
    for column_format in &layout.column_formats {
        host.set_column_format(c_sheet, column_format)?;
    }
    for region in layout.merges() {
        let range = region.to_range();
        if range.height() * range.width() < 2 {
            continue;
        }
        let value = layout
            .cells
            .get(range.row_start - layout.row_origin)
            .and_then(|row| row.get(range.col_start - layout.col_origin))
            .cloned()
            .unwrap_or_else(EnumCellValue::empty);
        host.merge_region(c_sheet, &range, &value)?;
    }
    for (col, width) in &layout.column_widths {
        host.set_column_width(c_sheet, *col, *width)?;
    }
    if let Some(chart) = &package.chart {
        host.insert_chart(c_sheet, chart)?;
    }

    for c_warning in &package.warnings {
        debug!(sheet = c_sheet, warning = %c_warning, "package warning");
    }
    info!(
        sheet = c_sheet,
        rows = layout.n_rows,
        cols = layout.n_cols,
        chart = package.chart.is_some(),
        warnings = package.warnings.len(),
        "applied report package"
    );
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// #region MemoryHost

/// Everything written to one in-memory sheet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecMemorySheet {
    /// Cell values keyed by `(row, col)`.
    pub cells: BTreeMap<(usize, usize), EnumCellValue>,
    /// Styled ranges in application order.
    pub styles: Vec<(SpecCellRange, SpecCellFormat)>,
    /// Column number formats.
    pub column_formats: Vec<SpecColumnFormat>,
    /// Merged ranges.
    pub merges: Vec<SpecCellRange>,
    /// Column widths.
    pub column_widths: BTreeMap<usize, f64>,
    /// Inserted charts.
    pub charts: Vec<SpecChart>,
}

/// `GridHost` that records writes in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryGridHost {
    /// Sheets keyed by name.
    pub sheets: HashMap<String, SpecMemorySheet>,
}

impl MemoryGridHost {
    /// Empty host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sheet by name, if anything was written to it.
    pub fn sheet(&self, sheet_name: &str) -> Option<&SpecMemorySheet> {
        self.sheets.get(sheet_name)
    }

    fn sheet_mut(&mut self, sheet_name: &str) -> &mut SpecMemorySheet {
        self.sheets.entry(sheet_name.to_string()).or_default()
    }
}

impl GridHost for MemoryGridHost {
    fn clear_block(&mut self, sheet_name: &str) -> Result<(), ReportError> {
        *self.sheet_mut(sheet_name) = SpecMemorySheet::default();
        Ok(())
    }

    fn write_block(
        &mut self,
        sheet_name: &str,
        row: usize,
        col: usize,
        cells: &[Vec<EnumCellValue>],
    ) -> Result<(), ReportError> {
        let sheet = self.sheet_mut(sheet_name);
        for (n_idx_row, l_row) in cells.iter().enumerate() {
            for (n_idx_col, value) in l_row.iter().enumerate() {
                sheet
                    .cells
                    .insert((row + n_idx_row, col + n_idx_col), value.clone());
            }
        }
        Ok(())
    }

    fn set_column_format(
        &mut self,
        sheet_name: &str,
        column_format: &SpecColumnFormat,
    ) -> Result<(), ReportError> {
        self.sheet_mut(sheet_name)
            .column_formats
            .push(column_format.clone());
        Ok(())
    }

    fn merge_region(
        &mut self,
        sheet_name: &str,
        range: &SpecCellRange,
        value: &EnumCellValue,
    ) -> Result<(), ReportError> {
        let sheet = self.sheet_mut(sheet_name);
        let if_overlaps = sheet.merges.iter().any(|other| {
            other.intersects_rows(range)
                && other.col_start <= range.col_end
                && range.col_start <= other.col_end
        });
        if if_overlaps {
            return Err(ReportError::Host(format!(
                "merge at row {}, column {} overlaps an existing merge",
                range.row_start, range.col_start
            )));
        }
        sheet.merges.push(*range);
        sheet
            .cells
            .insert((range.row_start, range.col_start), value.clone());
        Ok(())
    }

    fn style_region(
        &mut self,
        sheet_name: &str,
        range: &SpecCellRange,
        style: &SpecCellFormat,
    ) -> Result<(), ReportError> {
        self.sheet_mut(sheet_name)
            .styles
            .push((*range, style.clone()));
        Ok(())
    }

    fn set_column_width(
        &mut self,
        sheet_name: &str,
        col: usize,
        width: f64,
    ) -> Result<(), ReportError> {
        self.sheet_mut(sheet_name).column_widths.insert(col, width);
        Ok(())
    }

    fn insert_chart(&mut self, sheet_name: &str, chart: &SpecChart) -> Result<(), ReportError> {
        self.sheet_mut(sheet_name).charts.push(chart.clone());
        Ok(())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::build_chart_spec;
    use crate::layout::compose_table_layout;
    use crate::spec::{
        EnumLegendPosition, EnumRegionKind, GridDate, SpecGridRegion, SpecLayoutOptions,
        SpecTable,
    };

    fn package(n_band: usize) -> SpecReportPackage {
        let table = SpecTable::new(
            vec!["Timestamp".to_string(), "temp".to_string()],
            vec![
                vec![EnumCellValue::Number(45_000.0), EnumCellValue::Number(1.0)],
                vec![EnumCellValue::Number(45_000.1), EnumCellValue::Number(2.0)],
            ],
        );
        let options = SpecLayoutOptions {
            n_rows_chart_band: n_band,
            ..Default::default()
        };
        let layout = compose_table_layout(&table, &options);
        let chart = layout.chart_band.and_then(|band| {
            build_chart_spec(
                &[GridDate(45_000.0), GridDate(45_000.1)],
                SpecCellRange::new(layout.row_data_start, 1, layout.row_data_start + 1, 1),
                vec!["temp".to_string()],
                SpecCellRange::new(layout.row_data_start, 0, layout.row_data_start + 1, 0),
                band,
                EnumLegendPosition::Bottom,
            )
        });
        SpecReportPackage {
            sheet_name: "edge_sensor".to_string(),
            layout,
            chart,
            warnings: vec![],
        }
    }

    #[test]
    fn test_apply_writes_cells_formats_and_chart() {
        let mut host = MemoryGridHost::new();
        apply_report_package(&mut host, &package(20)).unwrap();

        let sheet = host.sheet("edge_sensor").unwrap();
        assert_eq!(sheet.cells[&(20, 0)], EnumCellValue::from("Timestamp"));
        assert_eq!(sheet.cells[&(22, 1)], EnumCellValue::Number(2.0));
        assert_eq!(sheet.column_formats.len(), 1);
        assert_eq!(sheet.charts.len(), 1);
        assert_eq!(sheet.styles.len(), 3);
        assert_eq!(sheet.column_widths.len(), 2);
    }

    #[test]
    fn test_reapply_is_idempotent() {
        let mut host = MemoryGridHost::new();
        let package = package(20);
        apply_report_package(&mut host, &package).unwrap();
        let sheet_first = host.sheet("edge_sensor").cloned();
        apply_report_package(&mut host, &package).unwrap();
        assert_eq!(host.sheet("edge_sensor").cloned(), sheet_first);
    }

    #[test]
    fn test_contract_violations_are_rejected() {
        let mut host = MemoryGridHost::new();

        let mut package_gap = package(0);
        package_gap.layout.regions.pop();
        assert!(matches!(
            apply_report_package(&mut host, &package_gap),
            Err(ReportError::RegionGap { .. })
        ));

        let mut package_anchor = package(20);
        if let Some(chart) = package_anchor.chart.as_mut() {
            chart.anchor_end = (21, 9);
        }
        assert!(matches!(
            apply_report_package(&mut host, &package_anchor),
            Err(ReportError::ChartAnchorOverlap { .. })
        ));
        assert!(host.sheet("edge_sensor").is_none());
    }

    #[test]
    fn test_chart_on_narrow_table_stays_inside_band() {
        let mut host = MemoryGridHost::new();
        let package = package(20);
        assert_eq!(package.layout.n_cols, 2);
        assert_eq!(package.layout.chart_band, Some(SpecCellRange::new(0, 0, 19, 9)));
        apply_report_package(&mut host, &package).unwrap();

        let mut package_wide = package.clone();
        if let Some(chart) = package_wide.chart.as_mut() {
            chart.anchor_end = (19, 12);
        }
        assert_eq!(
            apply_report_package(&mut host, &package_wide),
            Err(ReportError::ChartAnchorOutsideBand { row: 19, col: 12 })
        );

        let mut package_no_band = package;
        package_no_band.layout.chart_band = None;
        assert!(matches!(
            apply_report_package(&mut host, &package_no_band),
            Err(ReportError::ChartAnchorOutsideBand { .. })
        ));
    }

    #[test]
    fn test_merged_region_keeps_top_left_value() {
        let mut host = MemoryGridHost::new();
        let mut package = package(0);
        package.layout.regions = vec![
            SpecGridRegion::new(0, 0, 1, 2, EnumRegionKind::Header).merged(),
            SpecGridRegion::new(1, 0, 2, 2, EnumRegionKind::Value),
        ];
        apply_report_package(&mut host, &package).unwrap();
        let sheet = host.sheet("edge_sensor").unwrap();
        assert_eq!(sheet.merges, vec![SpecCellRange::new(0, 0, 0, 1)]);
        assert_eq!(sheet.cells[&(0, 0)], EnumCellValue::from("Timestamp"));
    }
}
