//! Small formatting helpers for log output.

use std::time::Duration;

/// Format an elapsed duration as `HHh MMm SSs`.
///
/// Hours are not wrapped at 24, so a two-day run prints `48h 00m 00s`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(format_elapsed(Duration::from_secs(3725)), "01h 02m 05s");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!(
        "{:02}h {:02}m {:02}s",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes on a character boundary, with
/// an ellipsis and the number of dropped bytes appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}
