//! Caller-owned workbook session implementing `GridHost`.
//!
//! Writes are buffered per sheet so a package can be cleared and rewritten;
//! the workbook is rendered once on [`XlsxSession::close`] or
//! [`XlsxSession::save_to_buffer`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use fogsheet_report::conf::{C_LIST_BULLET, C_LIST_TEXT_PREFIX};
use fogsheet_report::host::{GridHost, apply_report_package};
use fogsheet_report::util::{create_sheet_identifier, sanitize_sheet_name};
use fogsheet_report::{
    EnumCellValue, EnumLegendPosition, ReportError, SpecCellFormat, SpecCellRange, SpecChart,
    SpecReportPackage,
};
use fogsheet_report::spec::SpecColumnFormat;
use rust_xlsxwriter::{
    Chart, ChartLegendPosition, ChartType, Format, FormatAlign, FormatBorder, Workbook, Worksheet,
};
use tracing::{debug, info};

use crate::conf::{N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, N_PX_CHART_COL, N_PX_CHART_ROW};
use crate::spec::{HostError, SpecXlsxSheetBuffer, SpecXlsxSheetReport};

/// Stateful workbook session.
///
/// Sheets keep their creation order. Logical names are sanitized and made
/// unique case-insensitively; re-using a logical name targets the same sheet.
pub struct XlsxSession {
    path_file_out: PathBuf,
    l_sheet_order: Vec<String>,
    dict_sheet_alias: BTreeMap<String, String>,
    set_sheet_names_existing: BTreeSet<String>,
    dict_sheets: BTreeMap<String, SpecXlsxSheetBuffer>,
    if_closed: bool,
}

impl XlsxSession {
    /// Create a session bound to an output path. Nothing is written until close.
    pub fn new(path_file_out: PathBuf) -> Self {
        Self {
            path_file_out,
            l_sheet_order: Vec::new(),
            dict_sheet_alias: BTreeMap::new(),
            set_sheet_names_existing: BTreeSet::new(),
            dict_sheets: BTreeMap::new(),
            if_closed: false,
        }
    }

    /// Return output file path as string.
    pub fn file_out(&self) -> String {
        self.path_file_out.to_string_lossy().to_string()
    }

    /// Final sheet names in creation order.
    pub fn sheet_names(&self) -> Vec<String> {
        self.l_sheet_order.clone()
    }

    /// Buffered state of a sheet by logical name.
    pub fn sheet(&self, sheet_name: &str) -> Option<&SpecXlsxSheetBuffer> {
        self.dict_sheet_alias
            .get(sheet_name)
            .and_then(|c_actual| self.dict_sheets.get(c_actual))
    }

    /// Per-sheet summary snapshot.
    pub fn report(&self) -> Vec<SpecXlsxSheetReport> {
        self.l_sheet_order
            .iter()
            .filter_map(|c_name| {
                let buffer = self.dict_sheets.get(c_name)?;
                Some(SpecXlsxSheetReport {
                    sheet_name: c_name.clone(),
                    n_cells: buffer.cells.len(),
                    n_merges: buffer.merges.len(),
                    n_charts: buffer.charts.len(),
                })
            })
            .collect()
    }

    /// Clear and rewrite the package's sheet.
    pub fn write_package(&mut self, package: &SpecReportPackage) -> Result<(), ReportError> {
        apply_report_package(self, package)
    }

    /// Render and flush workbook to disk. Idempotent.
    pub fn close(&mut self) -> Result<(), HostError> {
        if self.if_closed {
            return Ok(());
        }
        let mut workbook = self.build_workbook()?;
        workbook.save(&self.path_file_out)?;
        self.if_closed = true;
        info!(path = %self.file_out(), sheets = self.l_sheet_order.len(), "saved workbook");
        Ok(())
    }

    /// Render the workbook into memory without closing the session.
    pub fn save_to_buffer(&self) -> Result<Vec<u8>, HostError> {
        let mut workbook = self.build_workbook()?;
        Ok(workbook.save_to_buffer()?)
    }

    fn derive_unique_sheet_name(&mut self, name: &str) -> String {
        let c_base = sanitize_sheet_name(name);
        if self.set_sheet_names_existing.insert(c_base.to_lowercase()) {
            return c_base;
        }

        let mut n_idx = 2usize;
        loop {
            let candidate = create_sheet_identifier(&c_base, n_idx);
            if self.set_sheet_names_existing.insert(candidate.to_lowercase()) {
                return candidate;
            }
            n_idx += 1;
        }
    }

    fn sheet_mut(&mut self, sheet_name: &str) -> Result<&mut SpecXlsxSheetBuffer, HostError> {
        if self.if_closed {
            return Err(HostError::Closed);
        }
        let c_actual = match self.dict_sheet_alias.get(sheet_name) {
            Some(c_actual) => c_actual.clone(),
            None => {
                let c_actual = self.derive_unique_sheet_name(sheet_name);
                debug!(logical = sheet_name, sheet = %c_actual, "created sheet");
                self.dict_sheet_alias
                    .insert(sheet_name.to_string(), c_actual.clone());
                self.l_sheet_order.push(c_actual.clone());
                c_actual
            }
        };
        Ok(self.dict_sheets.entry(c_actual).or_default())
    }

    fn build_workbook(&self) -> Result<Workbook, HostError> {
        let mut workbook = Workbook::new();
        let mut dict_fmt_cache: HashMap<(SpecCellFormat, bool), Format> = HashMap::new();

        for c_name in &self.l_sheet_order {
            let Some(buffer) = self.dict_sheets.get(c_name) else {
                continue;
            };
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(c_name)?;
            write_sheet_buffer(worksheet, c_name, buffer, &mut dict_fmt_cache)?;
        }
        Ok(workbook)
    }
}

impl GridHost for XlsxSession {
    fn clear_block(&mut self, sheet_name: &str) -> Result<(), ReportError> {
        *self.sheet_mut(sheet_name)? = SpecXlsxSheetBuffer::default();
        Ok(())
    }

    fn write_block(
        &mut self,
        sheet_name: &str,
        row: usize,
        col: usize,
        cells: &[Vec<EnumCellValue>],
    ) -> Result<(), ReportError> {
        let n_width = cells.iter().map(Vec::len).max().unwrap_or(0);
        validate_cell_bounds(row + cells.len().saturating_sub(1), col + n_width.saturating_sub(1))?;

        let buffer = self.sheet_mut(sheet_name)?;
        for (n_idx_row, l_row) in cells.iter().enumerate() {
            for (n_idx_col, value) in l_row.iter().enumerate() {
                buffer
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
        validate_cell_bounds(column_format.row_end, column_format.col)?;
        let fmt_patch = SpecCellFormat {
            num_format: Some(column_format.num_format.clone()),
            ..Default::default()
        };
        let buffer = self.sheet_mut(sheet_name)?;
        for row in column_format.row_start..=column_format.row_end {
            let fmt = buffer.formats.entry((row, column_format.col)).or_default();
            *fmt = fmt.merge(&fmt_patch);
        }
        Ok(())
    }

    fn merge_region(
        &mut self,
        sheet_name: &str,
        range: &SpecCellRange,
        value: &EnumCellValue,
    ) -> Result<(), ReportError> {
        validate_cell_bounds(range.row_end, range.col_end)?;
        let buffer = self.sheet_mut(sheet_name)?;
        let if_overlaps = buffer.merges.iter().any(|other| {
            other.intersects_rows(range)
                && other.col_start <= range.col_end
                && range.col_start <= other.col_end
        });
        if if_overlaps {
            return Err(HostError::MergeOverlap {
                row: range.row_start,
                col: range.col_start,
            }
            .into());
        }
        buffer.merges.push(*range);
        buffer
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
        validate_cell_bounds(range.row_end, range.col_end)?;
        let buffer = self.sheet_mut(sheet_name)?;
        for row in range.row_start..=range.row_end {
            for col in range.col_start..=range.col_end {
                let fmt = buffer.formats.entry((row, col)).or_default();
                *fmt = fmt.merge(style);
            }
        }
        Ok(())
    }

    fn set_column_width(
        &mut self,
        sheet_name: &str,
        col: usize,
        width: f64,
    ) -> Result<(), ReportError> {
        validate_cell_bounds(0, col)?;
        self.sheet_mut(sheet_name)?.column_widths.insert(col, width);
        Ok(())
    }

    fn insert_chart(&mut self, sheet_name: &str, chart: &SpecChart) -> Result<(), ReportError> {
        validate_cell_bounds(chart.anchor_end.0, chart.anchor_end.1)?;
        self.sheet_mut(sheet_name)?.charts.push(chart.clone());
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region Rendering

fn write_sheet_buffer(
    worksheet: &mut Worksheet,
    sheet_name: &str,
    buffer: &SpecXlsxSheetBuffer,
    dict_fmt_cache: &mut HashMap<(SpecCellFormat, bool), Format>,
) -> Result<(), HostError> {
    let fmt_empty = SpecCellFormat::default();

    for (&(row, col), value) in &buffer.cells {
        if buffer.find_merge(row, col).is_some() {
            continue;
        }
        let fmt_spec = buffer.formats.get(&(row, col)).unwrap_or(&fmt_empty);
        write_cell_with_format(worksheet, row, col, value, fmt_spec, dict_fmt_cache)?;
    }

    for range in &buffer.merges {
        let fmt_spec = buffer
            .formats
            .get(&(range.row_start, range.col_start))
            .unwrap_or(&fmt_empty);
        let format = derive_cached_format(fmt_spec, false, dict_fmt_cache);
        worksheet.merge_range(
            cast_row_num(range.row_start)?,
            cast_col_num(range.col_start)?,
            cast_row_num(range.row_end)?,
            cast_col_num(range.col_end)?,
            "",
            &format,
        )?;
        if let Some(value) = buffer.cells.get(&(range.row_start, range.col_start)) {
            write_cell_with_format(
                worksheet,
                range.row_start,
                range.col_start,
                value,
                fmt_spec,
                dict_fmt_cache,
            )?;
        }
    }

    for (&col, &width) in &buffer.column_widths {
        worksheet.set_column_width(cast_col_num(col)?, width)?;
    }

    for chart in &buffer.charts {
        let chart_xlsx = derive_rust_xlsx_chart(sheet_name, chart)?;
        worksheet.insert_chart(
            cast_row_num(chart.anchor_start.0)?,
            cast_col_num(chart.anchor_start.1)?,
            &chart_xlsx,
        )?;
    }
    Ok(())
}

fn derive_cached_format(
    fmt_spec: &SpecCellFormat,
    if_quote_prefix: bool,
    dict_fmt_cache: &mut HashMap<(SpecCellFormat, bool), Format>,
) -> Format {
    dict_fmt_cache
        .entry((fmt_spec.clone(), if_quote_prefix))
        .or_insert_with(|| {
            let format = derive_rust_xlsx_format(fmt_spec);
            if if_quote_prefix {
                format.set_quote_prefix()
            } else {
                format
            }
        })
        .clone()
}

/// Text to store for a string cell and whether it needs a quote prefix.
///
/// Only the list marker (`'` before the first bullet) becomes the quote-prefix
/// attribute; any other leading apostrophe is cell data.
pub fn derive_cell_text(text: &str) -> (&str, bool) {
    match text.strip_prefix(C_LIST_TEXT_PREFIX) {
        Some(c_rest) if c_rest.starts_with(C_LIST_BULLET) => (c_rest, true),
        _ => (text, false),
    }
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row_idx: usize,
    col_idx: usize,
    value: &EnumCellValue,
    fmt_spec: &SpecCellFormat,
    dict_fmt_cache: &mut HashMap<(SpecCellFormat, bool), Format>,
) -> Result<(), HostError> {
    let n_row = cast_row_num(row_idx)?;
    let n_col = cast_col_num(col_idx)?;
    match value {
        value if value.is_empty() => {
            let format = derive_cached_format(fmt_spec, false, dict_fmt_cache);
            worksheet.write_blank(n_row, n_col, &format)?;
        }
        EnumCellValue::String(val) => {
            let (c_text, if_quote_prefix) = derive_cell_text(val);
            let fmt_spec_text = if c_text.contains('\n') {
                fmt_spec.with_(SpecCellFormat {
                    text_wrap: Some(true),
                    ..Default::default()
                })
            } else {
                fmt_spec.clone()
            };
            let format = derive_cached_format(&fmt_spec_text, if_quote_prefix, dict_fmt_cache);
            worksheet.write_string_with_format(n_row, n_col, c_text, &format)?;
        }
        EnumCellValue::Number(val) => {
            let format = derive_cached_format(fmt_spec, false, dict_fmt_cache);
            worksheet.write_number_with_format(n_row, n_col, *val, &format)?;
        }
        EnumCellValue::Boolean(val) => {
            let format = derive_cached_format(fmt_spec, false, dict_fmt_cache);
            worksheet.write_boolean_with_format(n_row, n_col, *val, &format)?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_chart(sheet_name: &str, chart: &SpecChart) -> Result<Chart, HostError> {
    let mut chart_xlsx = Chart::new(ChartType::ScatterStraight);
    let region_cat = &chart.category_region;
    let region_val = &chart.series_region;

    for (n_idx, col) in (region_val.col_start..=region_val.col_end).enumerate() {
        let series = chart_xlsx.add_series();
        series
            .set_categories((
                sheet_name,
                cast_row_num(region_cat.row_start)?,
                cast_col_num(region_cat.col_start)?,
                cast_row_num(region_cat.row_end)?,
                cast_col_num(region_cat.col_end)?,
            ))
            .set_values((
                sheet_name,
                cast_row_num(region_val.row_start)?,
                cast_col_num(col)?,
                cast_row_num(region_val.row_end)?,
                cast_col_num(col)?,
            ));
        if let Some(c_name) = chart.series_names.get(n_idx) {
            series.set_name(c_name.as_str());
        }
    }

    chart_xlsx
        .x_axis()
        .set_min(chart.axis_min.value())
        .set_max(chart.axis_max.value())
        .set_major_unit(chart.major_unit_days())
        .set_num_format(chart.category_format.as_str());

    match derive_legend_position(chart.legend_position) {
        Some(position) => {
            chart_xlsx.legend().set_position(position);
        }
        None => {
            chart_xlsx.legend().set_hidden();
        }
    }

    let n_cols = chart.anchor_end.1.saturating_sub(chart.anchor_start.1) + 1;
    let n_rows = chart.anchor_end.0.saturating_sub(chart.anchor_start.0) + 1;
    chart_xlsx
        .set_width((n_cols * N_PX_CHART_COL) as u32)
        .set_height((n_rows * N_PX_CHART_ROW) as u32);

    Ok(chart_xlsx)
}

fn derive_legend_position(position: EnumLegendPosition) -> Option<ChartLegendPosition> {
    match position {
        EnumLegendPosition::Right => Some(ChartLegendPosition::Right),
        EnumLegendPosition::Bottom => Some(ChartLegendPosition::Bottom),
        EnumLegendPosition::Top => Some(ChartLegendPosition::Top),
        EnumLegendPosition::Left => Some(ChartLegendPosition::Left),
        EnumLegendPosition::None => None,
    }
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }
    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        7 => FormatBorder::Hair,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

fn validate_cell_bounds(row: usize, col: usize) -> Result<(), HostError> {
    if row >= N_NROWS_EXCEL_MAX {
        return Err(HostError::RowOverflow(row));
    }
    if col >= N_NCOLS_EXCEL_MAX {
        return Err(HostError::ColOverflow(col));
    }
    Ok(())
}

fn cast_row_num(value: usize) -> Result<u32, HostError> {
    u32::try_from(value).map_err(|_| HostError::RowOverflow(value))
}

fn cast_col_num(value: usize) -> Result<u16, HostError> {
    u16::try_from(value).map_err(|_| HostError::ColOverflow(value))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
