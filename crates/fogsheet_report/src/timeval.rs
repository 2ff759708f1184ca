//! Conversion between wire timestamps and `GridDate` serials.
//!
//! Bare epoch numbers carry no unit, so [`convert_epoch_number`] applies a
//! magnitude heuristic. It is a policy, not a decoder: values near the tier
//! boundaries are ambiguous and upstreams should send tagged strings.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde_json::Value;

use crate::conf::{
    N_EPOCH_MICROS_MIN, N_EPOCH_MILLIS_MIN, N_EPOCH_SECONDS_MIN, N_GRID_DATE_SERIAL_MAX,
    N_GRID_DATE_UNIX_OFFSET_DAYS, N_MS_PER_DAY,
};
use crate::spec::{EnumDateStyle, EnumRawTimestamp, GridDate};

static RE_FOGLAMP_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})[ T](\d{2}):(\d{2}):(\d{2})(?:\.(\d+))?\s*(Z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("static FogLAMP timestamp pattern")
});

////////////////////////////////////////////////////////////////////////////////
// #region Parsing

/// Parse `YYYY-MM-DD[ T]HH:MM:SS[.ffffff][offset]` as UTC.
///
/// The fraction is right-padded or truncated to six digits (microseconds) and
/// reduced to milliseconds by integer division.
pub fn parse_foglamp_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let caps = RE_FOGLAMP_TIMESTAMP.captures(text.trim())?;
    let n_field = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());

    let n_year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let n_micros = match caps.get(7) {
        Some(m) => {
            let c_digits: String = m.as_str().chars().chain(std::iter::repeat('0')).take(6).collect();
            c_digits.parse::<u32>().ok()?
        }
        None => 0,
    };

    let dt_naive = NaiveDate::from_ymd_opt(n_year, n_field(2)?, n_field(3)?)?.and_hms_milli_opt(
        n_field(4)?,
        n_field(5)?,
        n_field(6)?,
        n_micros / 1_000,
    )?;
    let n_secs_offset = match caps.get(8) {
        Some(m) => parse_utc_offset_seconds(m.as_str())?,
        None => 0,
    };

    Some(dt_naive.and_utc() - chrono::Duration::seconds(n_secs_offset))
}

fn parse_utc_offset_seconds(text: &str) -> Option<i64> {
    if text == "Z" {
        return Some(0);
    }
    let n_sign = if text.starts_with('-') { -1 } else { 1 };
    let c_digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if c_digits.len() != 4 {
        return None;
    }
    let n_hours = c_digits[..2].parse::<i64>().ok()?;
    let n_minutes = c_digits[2..].parse::<i64>().ok()?;
    Some(n_sign * (n_hours * 3_600 + n_minutes * 60))
}

/// Convert a bare number using the magnitude heuristic.
///
/// `> 1e14` microseconds, `(1e12, 1e14]` milliseconds, `(1e9, 1e12]` seconds,
/// `(25569, 100000)` already a serial, anything else milliseconds.
pub fn convert_epoch_number(value: f64) -> Option<GridDate> {
    if !value.is_finite() {
        return None;
    }

    let n_ms = if value > N_EPOCH_MICROS_MIN {
        (value / 1_000.0).floor()
    } else if value > N_EPOCH_MILLIS_MIN {
        value.round()
    } else if value > N_EPOCH_SECONDS_MIN {
        (value * 1_000.0).round()
    } else if value > N_GRID_DATE_UNIX_OFFSET_DAYS && value < N_GRID_DATE_SERIAL_MAX {
        return Some(GridDate(value));
    } else {
        value.round()
    };

    Some(GridDate(n_ms / N_MS_PER_DAY + N_GRID_DATE_UNIX_OFFSET_DAYS))
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region GridDateConversion

/// Convert any supported wire timestamp; `None` when unparseable.
pub fn to_grid_date(raw: &EnumRawTimestamp) -> Option<GridDate> {
    match raw {
        EnumRawTimestamp::Text(text) => {
            let c_text = text.trim();
            if let Some(dt) = parse_foglamp_timestamp(c_text) {
                return Some(grid_date_from_datetime(&dt));
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(c_text) {
                return Some(grid_date_from_datetime(&dt.with_timezone(&Utc)));
            }
            c_text.parse::<f64>().ok().and_then(convert_epoch_number)
        }
        EnumRawTimestamp::Number(n) => convert_epoch_number(*n),
        EnumRawTimestamp::Missing => None,
    }
}

/// Convert a JSON timestamp value of any supported shape.
pub fn grid_date_from_json(value: &Value) -> Option<GridDate> {
    to_grid_date(&EnumRawTimestamp::from(value))
}

/// Exact conversion from a UTC instant.
pub fn grid_date_from_datetime(dt: &DateTime<Utc>) -> GridDate {
    GridDate(dt.timestamp_millis() as f64 / N_MS_PER_DAY + N_GRID_DATE_UNIX_OFFSET_DAYS)
}

/// Inverse of [`grid_date_from_datetime`], rounded to the millisecond.
pub fn from_grid_date(grid_date: GridDate) -> Option<DateTime<Utc>> {
    let n_value = grid_date.value();
    if !n_value.is_finite() {
        return None;
    }
    let n_ms = ((n_value - N_GRID_DATE_UNIX_OFFSET_DAYS) * N_MS_PER_DAY).round();
    if n_ms.abs() > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_millis(n_ms as i64)
}

/// Render a 12-hour clock label; empty when out of range.
pub fn format_grid_date(grid_date: GridDate, style: EnumDateStyle) -> String {
    let Some(dt) = from_grid_date(grid_date) else {
        return String::new();
    };
    let c_pattern = match style {
        EnumDateStyle::DateTime => "%m/%d/%Y %I:%M:%S %p",
        EnumDateStyle::Date => "%m/%d/%Y",
        EnumDateStyle::Time => "%I:%M:%S %p",
    };
    dt.format(c_pattern).to_string()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
            + chrono::Duration::milliseconds(ms as i64)
    }

    #[test]
    fn test_parse_foglamp_timestamp_truncates_micros_to_millis() {
        let dt = parse_foglamp_timestamp("2024-03-05 14:07:09.123456").unwrap();
        assert_eq!(dt, utc(2024, 3, 5, 14, 7, 9, 123));

        let dt_short = parse_foglamp_timestamp("2024-03-05 14:07:09.5").unwrap();
        assert_eq!(dt_short.nanosecond(), 500_000_000);

        let dt_long = parse_foglamp_timestamp("2024-03-05T14:07:09.1239999").unwrap();
        assert_eq!(dt_long, utc(2024, 3, 5, 14, 7, 9, 123));
    }

    #[test]
    fn test_parse_foglamp_timestamp_honours_offset_and_rejects_garbage() {
        assert_eq!(
            parse_foglamp_timestamp("2024-03-05 14:07:09.000000+00:00"),
            Some(utc(2024, 3, 5, 14, 7, 9, 0))
        );
        assert_eq!(
            parse_foglamp_timestamp("2024-03-05 14:07:09+02:00"),
            Some(utc(2024, 3, 5, 12, 7, 9, 0))
        );
        assert_eq!(parse_foglamp_timestamp("yesterday"), None);
        assert_eq!(parse_foglamp_timestamp("2024-13-05 14:07:09"), None);
        assert_eq!(parse_foglamp_timestamp("x2024-03-05 14:07:09"), None);
    }

    #[test]
    fn test_unix_epoch_is_grid_offset() {
        let grid_date = grid_date_from_datetime(&utc(1970, 1, 1, 0, 0, 0, 0));
        assert_eq!(grid_date, GridDate(25_569.0));
    }

    #[test]
    fn test_epoch_number_tiers() {
        let n_expected = grid_date_from_datetime(&utc(2023, 11, 14, 22, 13, 20, 0));

        assert_eq!(convert_epoch_number(1_700_000_000.0), Some(n_expected));
        assert_eq!(convert_epoch_number(1_700_000_000_000.0), Some(n_expected));
        assert_eq!(convert_epoch_number(1_700_000_000_000_000.0), Some(n_expected));
        assert_eq!(convert_epoch_number(45_000.25), Some(GridDate(45_000.25)));
        assert_eq!(
            convert_epoch_number(5_000.0),
            Some(GridDate(5_000.0 / N_MS_PER_DAY + 25_569.0))
        );
        assert_eq!(convert_epoch_number(f64::NAN), None);
    }

    #[test]
    fn test_to_grid_date_accepts_text_shapes() {
        let n_expected = grid_date_from_datetime(&utc(2024, 3, 5, 14, 7, 9, 250));
        for c_text in [
            "2024-03-05 14:07:09.250",
            "2024-03-05T14:07:09.250Z",
            "2024-03-05T16:07:09.250+02:00",
        ] {
            assert_eq!(
                to_grid_date(&EnumRawTimestamp::from(c_text)),
                Some(n_expected),
                "{c_text}"
            );
        }
        assert_eq!(to_grid_date(&EnumRawTimestamp::from("n/a")), None);
        assert_eq!(to_grid_date(&EnumRawTimestamp::Missing), None);
        assert_eq!(
            grid_date_from_json(&serde_json::json!(1_700_000_000)),
            convert_epoch_number(1_700_000_000.0)
        );
    }

    #[test]
    fn test_round_trip_is_exact_to_the_millisecond() {
        let l_ms = [
            0_i64,
            1,
            -1,
            999,
            1_700_000_000_123,
            1_709_647_629_999,
            -2_208_988_800_000,
            253_402_300_799_999,
        ];
        for n_ms in l_ms {
            let dt = DateTime::from_timestamp_millis(n_ms).unwrap();
            let back = from_grid_date(grid_date_from_datetime(&dt)).unwrap();
            assert_eq!(back.timestamp_millis(), n_ms);
        }
    }

    #[test]
    fn test_format_grid_date_uses_twelve_hour_clock() {
        let grid_date = grid_date_from_datetime(&utc(2024, 3, 5, 14, 7, 9, 0));
        assert_eq!(
            format_grid_date(grid_date, EnumDateStyle::DateTime),
            "03/05/2024 02:07:09 PM"
        );
        assert_eq!(format_grid_date(grid_date, EnumDateStyle::Date), "03/05/2024");
        assert_eq!(format_grid_date(grid_date, EnumDateStyle::Time), "02:07:09 PM");
        assert_eq!(format_grid_date(GridDate(f64::NAN), EnumDateStyle::Date), "");
    }
}
