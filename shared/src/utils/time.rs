//! Time-related utilities

use chrono::{DateTime, TimeZone};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current system time in milliseconds since UNIX epoch
pub fn system_time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Calendar day of `at` as `yyyy-MM-dd`, used to name storage directories
pub fn day_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_system_time() {
        // After 2020
        assert!(system_time_millis() > 1_600_000_000_000);
    }

    #[test]
    fn test_day_stamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 0).unwrap();
        assert_eq!(day_stamp(&at), "2024-03-07");
        assert_eq!(day_stamp(&chrono::Local::now()).len(), 10);
    }
}
