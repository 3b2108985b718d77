//! Timestamp utilities

use chrono::{DateTime, Local, Utc};

/// Human-readable format used for date received and note stamps
/// (e.g. "March 04, 2025 02:15 PM")
pub const DISPLAY_FORMAT: &str = "%B %d, %Y %I:%M %p";

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current local time in the display format
pub fn display_now() -> String {
    Local::now().format(DISPLAY_FORMAT).to_string()
}

/// Convert milliseconds to duration
pub fn millis_to_duration(millis: u64) -> std::time::Duration {
    std::time::Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01
    }

    #[test]
    fn test_display_now_parses_back() {
        let text = display_now();
        let parsed = chrono::NaiveDateTime::parse_from_str(&text, DISPLAY_FORMAT);
        assert!(parsed.is_ok(), "unexpected display timestamp: {}", text);
        assert!(text.ends_with("AM") || text.ends_with("PM"));
    }

    #[test]
    fn test_millis_to_duration() {
        assert_eq!(millis_to_duration(0), Duration::ZERO);
        assert_eq!(millis_to_duration(1000), Duration::from_secs(1));
        assert_eq!(millis_to_duration(3_600_000), Duration::from_secs(3600));
    }
}
