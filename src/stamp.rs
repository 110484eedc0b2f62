//! Wall-clock timestamps, display only.
//!
//! Nothing in the emulator makes a decision on wall time; these helpers
//! exist solely for log lines, status reports, and snapshot headers.

use chrono::{DateTime, Local};

/// The literal stamp layout used by process logs, reports, and snapshots,
/// e.g. `06/19/2026 09:41:03AM`.
pub const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %I:%M:%S%p";

/// Format a timestamp in the emulator's display layout.
pub fn format_timestamp(t: DateTime<Local>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Current local time in the emulator's display layout.
pub fn now_string() -> String {
    format_timestamp(Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stamp_layout_is_stable() {
        let t = Local.with_ymd_and_hms(2026, 6, 19, 21, 5, 9).unwrap();
        assert_eq!(format_timestamp(t), "06/19/2026 09:05:09PM");
    }
}
