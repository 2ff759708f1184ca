//! Adaptive time-axis chart descriptors.

use tracing::debug;

use crate::conf::{
    N_AXIS_TICKS_TARGET, N_MS_PER_DAY, N_SECS_AXIS_HOURS_MAX, N_SECS_AXIS_MINUTES_MAX,
    N_SECS_AXIS_SECONDS_MAX,
};
use crate::spec::{
    EnumLegendPosition, EnumTimeUnit, GridDate, ReportError, SpecCellRange, SpecChart,
};

const TUP_NICE_MANTISSAS: [f64; 4] = [1.0, 2.0, 5.0, 10.0];

/// Span between two serials in seconds, rounded to the millisecond.
pub fn calculate_total_seconds(min: GridDate, max: GridDate) -> f64 {
    ((max.value() - min.value()) * N_MS_PER_DAY).round() / 1_000.0
}

/// Axis granularity and category label format for a span.
pub fn select_time_unit(n_secs_total: f64) -> (EnumTimeUnit, &'static str) {
    if n_secs_total <= N_SECS_AXIS_SECONDS_MAX {
        (EnumTimeUnit::Seconds, "hh:mm:ss")
    } else if n_secs_total <= N_SECS_AXIS_MINUTES_MAX {
        (EnumTimeUnit::Minutes, "hh:mm")
    } else if n_secs_total <= N_SECS_AXIS_HOURS_MAX {
        (EnumTimeUnit::Hours, "mm/dd hh:mm")
    } else {
        (EnumTimeUnit::Days, "mm/dd/yyyy")
    }
}

/// Nearest of `{1, 2, 5, 10} * 10^n`; non-positive input gives `1`.
pub fn nice_step(n_raw: f64) -> f64 {
    if !n_raw.is_finite() || n_raw <= 0.0 {
        return 1.0;
    }
    let n_base = 10f64.powf(n_raw.log10().floor());
    let n_fraction = n_raw / n_base;
    let n_mantissa = TUP_NICE_MANTISSAS
        .iter()
        .copied()
        .min_by(|a, b| (n_fraction - a).abs().total_cmp(&(n_fraction - b).abs()))
        .unwrap_or(1.0);
    n_mantissa * n_base
}

/// Pinned axis bounds over the finite points.
///
/// `None` with fewer than two finite points or a span under one millisecond.
pub fn derive_axis_span(grid_dates: &[GridDate]) -> Option<(GridDate, GridDate)> {
    let mut l_points = grid_dates.iter().copied().filter(|g| g.value().is_finite());
    let first = l_points.next()?;
    let (axis_min, axis_max, n_points) = l_points.fold((first, first, 1usize), |(lo, hi, n), g| {
        (if g < lo { g } else { lo }, if g > hi { g } else { hi }, n + 1)
    });
    if n_points < 2 || calculate_total_seconds(axis_min, axis_max) <= 0.0 {
        return None;
    }
    Some((axis_min, axis_max))
}

/// Build a line chart descriptor over placed time and value columns.
///
/// `None` when [`derive_axis_span`] finds no usable span. The axis is pinned to
/// the exact data span and the chart is anchored to `anchor_band`.
pub fn build_chart_spec(
    grid_dates: &[GridDate],
    series_region: SpecCellRange,
    series_names: Vec<String>,
    category_region: SpecCellRange,
    anchor_band: SpecCellRange,
    legend_position: EnumLegendPosition,
) -> Option<SpecChart> {
    let (axis_min, axis_max) = derive_axis_span(grid_dates)?;
    let n_secs_total = calculate_total_seconds(axis_min, axis_max);
    let (major_unit_scale, c_format) = select_time_unit(n_secs_total);
    let major_unit = nice_step(n_secs_total / major_unit_scale.seconds() / N_AXIS_TICKS_TARGET);

    debug!(
        points = grid_dates.len(),
        seconds = n_secs_total,
        unit = %major_unit_scale,
        major_unit,
        "built chart spec"
    );

    Some(SpecChart {
        series_region,
        series_names,
        category_region,
        category_format: c_format.to_string(),
        major_unit,
        major_unit_scale,
        axis_min,
        axis_max,
        legend_position,
        anchor_start: (anchor_band.row_start, anchor_band.col_start),
        anchor_end: (anchor_band.row_end, anchor_band.col_end),
    })
}

/// Reject charts whose anchor rows overlap the given data rows.
pub fn validate_chart_anchor(chart: &SpecChart, data_range: &SpecCellRange) -> Result<(), ReportError> {
    let anchor = SpecCellRange::new(
        chart.anchor_start.0,
        chart.anchor_start.1,
        chart.anchor_end.0,
        chart.anchor_end.1,
    );
    if anchor.intersects_rows(data_range) {
        return Err(ReportError::ChartAnchorOverlap {
            anchor_row_start: anchor.row_start,
            anchor_row_end: anchor.row_end,
        });
    }
    Ok(())
}

/// Reject charts whose anchor corners fall outside `band`.
///
/// Without a band the package reserves no chart space, so any chart is rejected.
pub fn validate_chart_band(chart: &SpecChart, band: Option<&SpecCellRange>) -> Result<(), ReportError> {
    for (row, col) in [chart.anchor_start, chart.anchor_end] {
        if !band.is_some_and(|band| band.contains(row, col)) {
            return Err(ReportError::ChartAnchorOutsideBand { row, col });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const N_BASE: f64 = 45_000.0;

    fn span(n_secs: f64) -> Vec<GridDate> {
        vec![
            GridDate(N_BASE),
            GridDate(N_BASE + n_secs / 86_400.0 / 2.0),
            GridDate(N_BASE + n_secs / 86_400.0),
        ]
    }

    fn chart_for(grid_dates: &[GridDate]) -> Option<SpecChart> {
        build_chart_spec(
            grid_dates,
            SpecCellRange::new(21, 2, 23, 2),
            vec!["temp".to_string()],
            SpecCellRange::new(21, 0, 23, 0),
            SpecCellRange::new(0, 0, 19, 9),
            EnumLegendPosition::Bottom,
        )
    }

    #[test]
    fn test_axis_unit_boundaries() {
        let unit = |n_secs: f64| chart_for(&span(n_secs)).unwrap().major_unit_scale;
        assert_eq!(unit(300.0), EnumTimeUnit::Seconds);
        assert_eq!(unit(300.001), EnumTimeUnit::Minutes);
        assert_eq!(unit(7_200.0), EnumTimeUnit::Minutes);
        assert_eq!(unit(7_200.001), EnumTimeUnit::Hours);
        assert_eq!(unit(172_800.0), EnumTimeUnit::Hours);
        assert_eq!(unit(172_800.001), EnumTimeUnit::Days);
    }

    #[test]
    fn test_nice_step_picks_nearest_candidate() {
        assert_eq!(nice_step(37.5), 50.0);
        assert_eq!(nice_step(12.0), 10.0);
        assert!((nice_step(0.3) - 0.2).abs() < 1e-12);
        assert_eq!(nice_step(0.0), 1.0);
    }

    #[test]
    fn test_chart_spec_pins_axis_and_formats_labels() {
        let chart = chart_for(&span(300.0)).unwrap();
        assert_eq!(chart.category_format, "hh:mm:ss");
        assert_eq!(chart.major_unit, 50.0);
        assert_eq!(chart.axis_min, GridDate(N_BASE));
        assert_eq!(chart.axis_max, GridDate(N_BASE + 300.0 / 86_400.0));
        assert_eq!(chart.anchor_end, (19, 9));

        let chart_days = chart_for(&span(10.0 * 86_400.0)).unwrap();
        assert_eq!(chart_days.category_format, "mm/dd/yyyy");
        assert_eq!(chart_days.major_unit, 1.0);
        assert!((chart_days.major_unit_days() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fewer_than_two_points_gives_none() {
        assert!(chart_for(&[]).is_none());
        assert!(chart_for(&[GridDate(N_BASE), GridDate(f64::NAN)]).is_none());
    }

    #[test]
    fn test_identical_timestamps_give_no_axis() {
        let l_same = [GridDate(N_BASE), GridDate(N_BASE), GridDate(N_BASE)];
        assert_eq!(derive_axis_span(&l_same), None);
        assert!(chart_for(&l_same).is_none());

        let l_points = [GridDate(N_BASE + 0.5), GridDate(f64::NAN), GridDate(N_BASE)];
        assert_eq!(
            derive_axis_span(&l_points),
            Some((GridDate(N_BASE), GridDate(N_BASE + 0.5)))
        );
    }

    #[test]
    fn test_anchor_over_data_rows_is_rejected() {
        let chart = chart_for(&span(60.0)).unwrap();
        assert!(validate_chart_anchor(&chart, &SpecCellRange::new(20, 0, 30, 2)).is_ok());
        assert_eq!(
            validate_chart_anchor(&chart, &SpecCellRange::new(19, 0, 30, 2)),
            Err(ReportError::ChartAnchorOverlap {
                anchor_row_start: 0,
                anchor_row_end: 19
            })
        );
    }
}
