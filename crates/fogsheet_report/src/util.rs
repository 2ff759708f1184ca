//! Stateless helpers shared by builders and hosts.

use crate::conf::{
    C_SHEET_NAME_REPLACEMENT, C_SHEET_NAME_SEPARATOR, N_LEN_SHEET_NAME_MAX, TUP_SHEET_NAME_ILLEGAL,
};

////////////////////////////////////////////////////////////////////////////////
// #region SheetNaming

fn replace_illegal_sheet_chars(name: &str) -> String {
    name.chars()
        .map(|chr| {
            if TUP_SHEET_NAME_ILLEGAL.contains(&chr) {
                C_SHEET_NAME_REPLACEMENT
            } else {
                chr
            }
        })
        .collect()
}

/// Replace invalid chars and trim to a valid sheet name.
pub fn sanitize_sheet_name(name: &str) -> String {
    let c_name = replace_illegal_sheet_chars(name).trim().to_string();
    if c_name.is_empty() {
        return "Sheet".to_string();
    }
    c_name.chars().take(N_LEN_SHEET_NAME_MAX).collect()
}

/// Join `left` and `right` into a host-safe name of at most `max_len` chars.
///
/// `right` (asset or report type) is kept whole; `left` (instance) is clipped
/// to `max_len - 1 - len(right)`. When `right` alone leaves no room, `left` is
/// dropped and `right` is clipped to `max_len`.
pub fn derive_sheet_name(left: &str, right: &str, max_len: usize) -> String {
    let c_left = replace_illegal_sheet_chars(left);
    let c_right = replace_illegal_sheet_chars(right);
    let n_len_right = c_right.chars().count();

    if c_right.is_empty() {
        return c_left.chars().take(max_len).collect();
    }
    if c_left.is_empty() || n_len_right + 1 >= max_len {
        return c_right.chars().take(max_len).collect();
    }

    let n_len_left_max = max_len - 1 - n_len_right;
    let c_left_clipped: String = c_left.chars().take(n_len_left_max).collect();
    format!("{c_left_clipped}{C_SHEET_NAME_SEPARATOR}{c_right}")
}

/// Create suffixed sheet name (`base_2`, `base_3`, ...), respecting length cap.
pub fn create_sheet_identifier(base_name: &str, part_idx_1based: usize) -> String {
    let c_sheet_name_suffix = format!("{C_SHEET_NAME_SEPARATOR}{part_idx_1based}");
    let n_len_base_name_max = N_LEN_SHEET_NAME_MAX.saturating_sub(c_sheet_name_suffix.len());

    let c_sheet_name_base: String = base_name
        .chars()
        .take(usize::max(1, n_len_base_name_max))
        .collect();

    format!("{c_sheet_name_base}{c_sheet_name_suffix}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WidthEstimation

/// Approximate displayed width; non-ASCII glyphs count as 1.6 columns.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_widest_line = s
        .lines()
        .map(|line| {
            let n_ascii = line.chars().filter(|chr| chr.is_ascii()).count();
            let n_non_ascii = line.chars().count().saturating_sub(n_ascii);
            n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
        })
        .max();
    n_widest_line.unwrap_or(0)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_sheet_name_keeps_right_part_whole() {
        let c_name = derive_sheet_name("Very-Long-Instance-Hostname-Example", "sensorA", 31);
        assert!(c_name.chars().count() <= 31);
        assert!(c_name.ends_with("_sensorA"));
        assert_eq!(c_name, "Very-Long-Instance-Host_sensorA");
    }

    #[test]
    fn test_derive_sheet_name_replaces_forbidden_chars() {
        assert_eq!(
            derive_sheet_name("http://host:8081", "a[1]/b", 31),
            "http---host-8081_a-1--b"
        );
        assert_eq!(derive_sheet_name("", "asset", 31), "asset");
        assert_eq!(derive_sheet_name("instance", "", 5), "insta");
    }

    #[test]
    fn test_derive_sheet_name_drops_left_when_right_fills_limit() {
        let c_right = "r".repeat(30);
        assert_eq!(derive_sheet_name("left", &c_right, 31), c_right);
        assert_eq!(derive_sheet_name("left", &"r".repeat(40), 31), "r".repeat(31));
    }

    #[test]
    fn test_sanitize_and_identifier() {
        assert_eq!(sanitize_sheet_name("  a*b  "), "a-b");
        assert_eq!(sanitize_sheet_name(" "), "Sheet");
        assert_eq!(
            create_sheet_identifier(&"x".repeat(40), 2),
            format!("{}_2", "x".repeat(29))
        );
    }

    #[test]
    fn test_estimate_width_uses_widest_line() {
        assert_eq!(estimate_unicode_string_width("ab\nabcd"), 4);
        assert_eq!(estimate_unicode_string_width("温度"), 3);
        assert_eq!(estimate_unicode_string_width(""), 0);
    }
}
