//! Human readable ages for timestamps shown to consumers

use chrono::{DateTime, TimeDelta, Utc};

const UNITS: [(&str, i64); 6] = [
    ("year", 365 * 24 * 60 * 60),
    ("month", 30 * 24 * 60 * 60),
    ("day", 24 * 60 * 60),
    ("hour", 60 * 60),
    ("minute", 60),
    ("second", 1),
];

fn elapsed(then: DateTime<Utc>, now: DateTime<Utc>) -> TimeDelta {
    (now - then).max(TimeDelta::zero())
}

/// Long form age such as `2 hours ago`, using the largest whole unit
pub fn time_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = elapsed(then, now).num_seconds();

    for (unit, size) in UNITS {
        let count = seconds / size;
        if count >= 1 {
            let plural = if count == 1 { "" } else { "s" };
            return format!("{} {}{} ago", count, unit, plural);
        }
    }

    "0 seconds ago".to_string()
}

/// Compact age such as `30m ago`, `2h ago` or `3d ago`
pub fn minutes_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = elapsed(then, now).num_minutes();

    if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 24 * 60 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / (24 * 60))
    }
}
