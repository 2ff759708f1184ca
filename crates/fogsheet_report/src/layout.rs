//! Absolute placement, region tiling and column autofit.

use std::collections::BTreeMap;

use tracing::debug;

use crate::conf::{C_NUM_FORMAT_DATETIME, N_COLS_CHART_WIDTH};
use crate::spec::{
    EnumAutofitColumnsRule, EnumCellValue, EnumRegionKind, ReportError, SpecAutofitCellsPolicy,
    SpecCellFormat, SpecCellRange, SpecColumnFormat, SpecCombinedReport, SpecGridLayout,
    SpecGridRegion, SpecLayoutOptions, SpecTable,
};

/// Width of a rendered `mm/dd/yyyy hh:mm:ss AM` label.
const N_WIDTH_DATETIME_LABEL: usize = 22;

////////////////////////////////////////////////////////////////////////////////
// #region Tiling

/// Check that `regions` cover every cell of `range` exactly once.
pub fn validate_region_tiling(
    regions: &[SpecGridRegion],
    range: &SpecCellRange,
) -> Result<(), ReportError> {
    let n_width = range.width();
    let mut l_covered = vec![false; range.height() * n_width];

    for region in regions {
        let region_range = region.to_range();
        if region.row_span == 0
            || region.col_span == 0
            || !range.contains(region_range.row_start, region_range.col_start)
            || !range.contains(region_range.row_end, region_range.col_end)
        {
            return Err(ReportError::RegionOutOfBounds {
                row: region.row_start,
                col: region.col_start,
            });
        }
        for row in region_range.row_start..=region_range.row_end {
            for col in region_range.col_start..=region_range.col_end {
                let n_idx = (row - range.row_start) * n_width + (col - range.col_start);
                if l_covered[n_idx] {
                    return Err(ReportError::RegionOverlap { row, col });
                }
                l_covered[n_idx] = true;
            }
        }
    }

    match l_covered.iter().position(|if_covered| !if_covered) {
        Some(n_idx) => Err(ReportError::RegionGap {
            row: range.row_start + n_idx / n_width,
            col: range.col_start + n_idx % n_width,
        }),
        None => Ok(()),
    }
}

/// Resolve each region's style against the kind presets.
fn resolve_region_styles(
    regions: Vec<SpecGridRegion>,
    formats: &BTreeMap<String, SpecCellFormat>,
) -> Vec<SpecGridRegion> {
    regions
        .into_iter()
        .map(|region| {
            let fmt_preset = formats
                .get(region.kind.format_key())
                .cloned()
                .unwrap_or_default();
            let fmt_final = match &region.style {
                Some(fmt_region) => fmt_preset.merge(fmt_region),
                None => fmt_preset,
            };
            region.styled(fmt_final)
        })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Autofit

/// Estimate displayed width units for one cell.
pub fn estimate_width_len(value: &EnumCellValue, if_is_datetime_col: bool) -> usize {
    match value {
        EnumCellValue::String(s) => crate::util::estimate_unicode_string_width(s),
        EnumCellValue::Boolean(b) => if *b { 4 } else { 5 },
        EnumCellValue::Number(n) => {
            if if_is_datetime_col {
                return N_WIDTH_DATETIME_LABEL;
            }
            if n.fract() == 0.0 && n.abs() < 1e15 {
                return (*n as i64).to_string().len();
            }
            format!("{n:.4}").len()
        }
    }
}

/// Column widths from header and body rows under `policy`.
///
/// `l_if_datetime` flags columns rendered as date labels. Returns an empty
/// list when the rule is `None`.
pub fn calculate_column_widths(
    header_rows: &[Vec<EnumCellValue>],
    body_rows: &[Vec<EnumCellValue>],
    l_if_datetime: &[bool],
    policy: &SpecAutofitCellsPolicy,
) -> Vec<f64> {
    if matches!(policy.rule_columns, EnumAutofitColumnsRule::None) {
        return vec![];
    }
    let n_cols = l_if_datetime.len();
    let measure = |rows: &[Vec<EnumCellValue>], n_rows_max: Option<usize>| {
        let mut l_widths = vec![0usize; n_cols];
        for row in rows.iter().take(n_rows_max.unwrap_or(usize::MAX)) {
            for (n_idx_col, value) in row.iter().enumerate().take(n_cols) {
                l_widths[n_idx_col] = usize::max(
                    l_widths[n_idx_col],
                    estimate_width_len(value, l_if_datetime[n_idx_col]),
                );
            }
        }
        l_widths
    };

    let l_width_by_col_header = measure(header_rows, None);
    let l_width_by_col_body = match policy.rule_columns {
        EnumAutofitColumnsRule::Header => vec![0usize; n_cols],
        _ => measure(body_rows, policy.height_body_inferred_max),
    };

    let n_min = usize::max(1, policy.width_cell_min);
    let n_max = usize::min(255, usize::max(n_min, policy.width_cell_max));
    (0..n_cols)
        .map(|n_idx_col| {
            let n_width_recorded = match policy.rule_columns {
                EnumAutofitColumnsRule::Header => l_width_by_col_header[n_idx_col],
                EnumAutofitColumnsRule::Body => l_width_by_col_body[n_idx_col],
                _ => usize::max(
                    l_width_by_col_header[n_idx_col],
                    l_width_by_col_body[n_idx_col],
                ),
            };
            usize::min(n_max, usize::max(n_min, n_width_recorded + policy.width_cell_padding))
                as f64
        })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Composition

fn is_timestamp_header(c_header: &str) -> bool {
    c_header.ends_with("Timestamp")
}

fn derive_datetime_num_format(options: &SpecLayoutOptions) -> String {
    options
        .formats
        .get("datetime")
        .and_then(|fmt| fmt.num_format.clone())
        .unwrap_or_else(|| C_NUM_FORMAT_DATETIME.to_string())
}

/// Place a single-header table, reserving `n_rows_chart_band` rows above it.
///
/// Layout, top to bottom: chart band (spacer), header row, data rows.
pub fn compose_table_layout(table: &SpecTable, options: &SpecLayoutOptions) -> SpecGridLayout {
    let n_cols = usize::max(1, table.width());
    let n_band = options.n_rows_chart_band;
    let n_rows_data = table.height();
    let row_origin = options.row_origin;
    let col_origin = options.col_origin;
    let row_header = row_origin + n_band;
    let row_data_start = row_header + 1;

    let mut l_cells: Vec<Vec<EnumCellValue>> = Vec::with_capacity(n_band + 1 + n_rows_data);
    l_cells.extend((0..n_band).map(|_| vec![EnumCellValue::empty(); n_cols]));
    let mut l_header_row: Vec<EnumCellValue> =
        table.headers.iter().map(|c| EnumCellValue::from(c.as_str())).collect();
    l_header_row.resize(n_cols, EnumCellValue::empty());
    l_cells.push(l_header_row);
    for row in &table.rows {
        let mut l_row = row.clone();
        l_row.resize(n_cols, EnumCellValue::empty());
        l_cells.push(l_row);
    }

    let mut l_regions = Vec::with_capacity(3);
    if n_band > 0 {
        l_regions.push(SpecGridRegion::new(
            row_origin,
            col_origin,
            n_band,
            n_cols,
            EnumRegionKind::Spacer,
        ));
    }
    l_regions.push(SpecGridRegion::new(
        row_header,
        col_origin,
        1,
        n_cols,
        EnumRegionKind::Header,
    ));
    if n_rows_data > 0 {
        l_regions.push(SpecGridRegion::new(
            row_data_start,
            col_origin,
            n_rows_data,
            n_cols,
            EnumRegionKind::Value,
        ));
    }

    let l_if_datetime: Vec<bool> = (0..n_cols)
        .map(|n_idx_col| {
            table
                .headers
                .get(n_idx_col)
                .is_some_and(|c_header| is_timestamp_header(c_header))
        })
        .collect();
    let c_num_format = derive_datetime_num_format(options);
    let l_column_formats: Vec<SpecColumnFormat> = if n_rows_data > 0 {
        l_if_datetime
            .iter()
            .enumerate()
            .filter(|(_, if_datetime)| **if_datetime)
            .map(|(n_idx_col, _)| SpecColumnFormat {
                col: col_origin + n_idx_col,
                row_start: row_data_start,
                row_end: row_data_start + n_rows_data - 1,
                num_format: c_num_format.clone(),
            })
            .collect()
    } else {
        vec![]
    };

    let l_widths = calculate_column_widths(
        &l_cells[n_band..=n_band],
        &l_cells[n_band + 1..],
        &l_if_datetime,
        &options.policy_autofit,
    );

    let chart_band = (n_band > 0).then(|| {
        SpecCellRange::new(
            row_origin,
            col_origin,
            row_origin + n_band - 1,
            col_origin + usize::max(n_cols, N_COLS_CHART_WIDTH) - 1,
        )
    });

    debug!(
        rows = l_cells.len(),
        cols = n_cols,
        chart_band_rows = n_band,
        "composed table layout"
    );

    SpecGridLayout {
        row_origin,
        col_origin,
        n_rows: l_cells.len(),
        n_cols,
        row_header: Some(row_header),
        row_data_start,
        cells: l_cells,
        regions: resolve_region_styles(l_regions, &options.formats),
        column_formats: l_column_formats,
        column_widths: l_widths
            .into_iter()
            .enumerate()
            .map(|(n_idx_col, n_width)| (col_origin + n_idx_col, n_width))
            .collect(),
        chart_band,
    }
}

/// Place a combined block; its own regions are shifted to the origin and checked.
///
/// The block has no chart band. Region styles override the kind presets.
pub fn compose_combined_layout(
    report: &SpecCombinedReport,
    options: &SpecLayoutOptions,
) -> Result<SpecGridLayout, ReportError> {
    let n_cols = usize::max(1, report.headers.len());
    let row_origin = options.row_origin;
    let col_origin = options.col_origin;

    let mut l_cells: Vec<Vec<EnumCellValue>> = Vec::with_capacity(report.rows.len() + 1);
    let mut l_title_row: Vec<EnumCellValue> = report
        .headers
        .iter()
        .map(|c| EnumCellValue::from(c.as_str()))
        .collect();
    l_title_row.resize(n_cols, EnumCellValue::empty());
    l_cells.push(l_title_row);
    for row in &report.rows {
        let mut l_row = row.clone();
        l_row.resize(n_cols, EnumCellValue::empty());
        l_cells.push(l_row);
    }

    let l_regions: Vec<SpecGridRegion> = report
        .regions
        .iter()
        .map(|region| region.shifted(row_origin, col_origin))
        .collect();
    let range = SpecCellRange::new(
        row_origin,
        col_origin,
        row_origin + l_cells.len() - 1,
        col_origin + n_cols - 1,
    );
    validate_region_tiling(&l_regions, &range)?;

    let l_if_datetime = vec![false; n_cols];
    let l_widths = calculate_column_widths(&[], &l_cells, &l_if_datetime, &options.policy_autofit);

    debug!(
        rows = l_cells.len(),
        cols = n_cols,
        regions = l_regions.len(),
        "composed combined layout"
    );

    Ok(SpecGridLayout {
        row_origin,
        col_origin,
        n_rows: l_cells.len(),
        n_cols,
        row_header: None,
        row_data_start: row_origin,
        cells: l_cells,
        regions: resolve_region_styles(l_regions, &options.formats),
        column_formats: vec![],
        column_widths: l_widths
            .into_iter()
            .enumerate()
            .map(|(n_idx_col, n_width)| (col_origin + n_idx_col, n_width))
            .collect(),
        chart_band: None,
    })
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
