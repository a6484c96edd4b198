//! Clock-style time formatting for status displays
//!
//! Elapsed/total values are shown as `HH:MM:SS`, with a whole-number
//! percentage of progress.

/// Format seconds as `HH:MM:SS`.
///
/// Fractions are truncated, negative and non-finite inputs are shown as
/// `00:00:00`. Hours are not wrapped at 24.
///
/// # Examples
///
/// ```
/// use tplay_common::time::format_clock;
///
/// assert_eq!(format_clock(0.0), "00:00:00");
/// assert_eq!(format_clock(61.9), "00:01:01");
/// assert_eq!(format_clock(3725.0), "01:02:05");
/// ```
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

/// Progress as a percentage in `[0, 100]`.
///
/// A zero or unknown total yields 0.
pub fn progress_percent(elapsed: f64, total: f64) -> f64 {
    if !(total.is_finite() && total > 0.0) || !elapsed.is_finite() {
        return 0.0;
    }
    (elapsed / total * 100.0).clamp(0.0, 100.0)
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}
