//! Human-readable rendering of sizes and timestamps for scan output.

use chrono::{DateTime, Local, Utc};
use std::time::Duration;

const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Formats a byte count with binary units, e.g. `1536` -> `"1.5 KiB"`.
pub fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Converts whole mebibytes into bytes, saturating on overflow.
pub fn mib_to_bytes(mib: u64) -> u64 {
    mib.saturating_mul(1024 * 1024)
}

/// Renders a modification time in the local timezone.
pub fn local_timestamp(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Renders a duration as `h:mm:ss`, or `m:ss` under an hour; `-` if unknown.
pub fn clock_duration(duration: Option<Duration>) -> String {
    let Some(duration) = duration else {
        return "-".to_string();
    };
    let secs = duration.as_secs_f64().round() as u64;
    let (hours, rest) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size_boundaries() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1024), "1.0 KiB");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(50 * 1024 * 1024), "50.0 MiB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn test_human_size_caps_at_largest_unit() {
        assert_eq!(human_size(u64::MAX), "16384.0 PiB");
    }

    #[test]
    fn test_mib_to_bytes_saturates() {
        assert_eq!(mib_to_bytes(50), 52_428_800);
        assert_eq!(mib_to_bytes(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_clock_duration() {
        assert_eq!(clock_duration(None), "-");
        assert_eq!(clock_duration(Some(Duration::ZERO)), "0:00");
        assert_eq!(clock_duration(Some(Duration::from_millis(59_600))), "1:00");
        assert_eq!(clock_duration(Some(Duration::from_secs(754))), "12:34");
        assert_eq!(clock_duration(Some(Duration::from_secs(3 * 3600 + 5))), "3:00:05");
    }
}
