//! Formatting helpers for terminal output.

use chrono::{DateTime, Duration, Utc};

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>) -> String {
    format_relative_time_at(ts, Utc::now())
}

fn format_relative_time_at(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        ts.format("%b %d").to_string()
    }
}

/// Format how long a run took (e.g., "1m 05s").
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Format the span between two optional timestamps, or "-" if either is missing.
pub fn format_span(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> String {
    match (start, end) {
        (Some(start), Some(end)) => format_duration(end - start),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time_at(now + Duration::seconds(5), now), "just now");
        assert_eq!(format_relative_time_at(now - Duration::seconds(42), now), "42s ago");
        assert_eq!(format_relative_time_at(now - Duration::minutes(3), now), "3m ago");
        assert_eq!(format_relative_time_at(now - Duration::hours(5), now), "5h ago");
        assert_eq!(format_relative_time_at(now - Duration::days(2), now), "2d ago");
        assert_eq!(format_relative_time_at(now - Duration::days(30), now), "Feb 18");
    }

    #[test]
    fn test_duration() {
        assert_eq!(format_duration(Duration::seconds(9)), "9s");
        assert_eq!(format_duration(Duration::seconds(65)), "1m 05s");
        assert_eq!(format_duration(Duration::seconds(7380)), "2h 03m");
        assert_eq!(format_duration(Duration::seconds(-3)), "0s");
    }

    #[test]
    fn test_span_needs_both_ends() {
        let start = Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap();
        assert_eq!(format_span(Some(start), None), "-");
        assert_eq!(format_span(Some(start), Some(start + Duration::seconds(90))), "1m 30s");
    }
}
