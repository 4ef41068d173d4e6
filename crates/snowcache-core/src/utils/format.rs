use chrono::Duration;

/// Describe how old a piece of cached data is, e.g. "~12m ago".
///
/// Hours round up from the half hour and days round up from the half day,
/// so 1h 40m reads as "~2h ago".
pub fn format_age(age: Duration) -> String {
    let minutes = age.num_minutes();
    if minutes < 1 {
        // Also covers negative ages from clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("~{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("~{}h ago", hours + 1)
        } else {
            format!("~{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("~{}d ago", days + 1)
        } else {
            format!("~{}d ago", days)
        }
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
