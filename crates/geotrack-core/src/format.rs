//! Human-readable formatting of times, durations, and distances
//!
//! Shared by the notification summary line and the API/history surfaces.
//! All date formatting is UTC so output is host-independent.

use chrono::{DateTime, Utc};

/// Format elapsed milliseconds as `MM:SS` (minutes are not capped at 59)
pub fn format_elapsed(elapsed_ms: i64) -> String {
    let total_seconds = (elapsed_ms / 1000).max(0);
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Format a duration as `1h 2m` above an hour, `3m 4s` below
pub fn format_duration(duration_ms: i64) -> String {
    let seconds = (duration_ms / 1000).max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else {
        format!("{}m {}s", minutes, seconds % 60)
    }
}

/// Format a distance: whole meters below 1 km, two-decimal kilometers above
pub fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.2} km", meters / 1000.0)
    } else {
        format!("{} m", meters.round() as i64)
    }
}

/// Format an epoch-millisecond timestamp as a UTC date string
pub fn format_date(timestamp_millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp_millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(59_999), "00:59");
        assert_eq!(format_elapsed(60_000), "01:00");
        assert_eq!(format_elapsed(3_725_000), "62:05");
    }

    #[test]
    fn test_format_elapsed_negative_clamps() {
        assert_eq!(format_elapsed(-500), "00:00");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45_000), "0m 45s");
        assert_eq!(format_duration(185_000), "3m 5s");
        assert_eq!(format_duration(3_720_000), "1h 2m");
        assert_eq!(format_duration(7_320_000), "2h 2m");
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(0.0), "0 m");
        assert_eq!(format_distance(850.4), "850 m");
        assert_eq!(format_distance(999.9), "1000 m");
        assert_eq!(format_distance(1000.0), "1.00 km");
        assert_eq!(format_distance(12_345.0), "12.35 km");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(1_700_000_000_000), "2023-11-14 22:13");
    }
}
