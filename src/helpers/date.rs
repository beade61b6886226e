//! Date helper functions

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 (`2024-01-15T10:30:00Z`) and the naive form the API
/// emits (`2024-01-15T10:30:00.123456`), which is taken as UTC.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<FixedOffset>> {
    let ts = ts.trim();
    if ts.is_empty() {
        return None;
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(ts) {
        return Some(date);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(ts, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(ts, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

/// Display date for post cards and headers, e.g. "January 15, 2024".
///
/// Unparsable input is returned unchanged.
pub fn format_display_date(ts: &str) -> String {
    match parse_timestamp(ts) {
        Some(date) => date.format("%B %-d, %Y").to_string(),
        None => ts.to_string(),
    }
}

/// Masthead date, e.g. "Monday, January 15, 2024"
pub fn long_weekday_date<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.format("%A, %B %-d, %Y").to_string()
}

/// Compact date used in the newsletter header, e.g. "Mon Jan 15 2024"
pub fn email_date<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    date.format("%a %b %d %Y").to_string()
}

/// Format a date using Moment.js-compatible format string
///
/// # Examples
/// ```ignore
/// format_date(&date, "YYYY-MM-DD") // -> "2024-01-15"
/// ```
pub fn format_date<Tz: TimeZone>(date: &DateTime<Tz>, format: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let chrono_format = moment_to_chrono_format(format);
    date.format(&chrono_format).to_string()
}

/// Get relative time (like "2 hours ago")
pub fn relative_date(date: &DateTime<Local>) -> String {
    relative_to(date, &Local::now())
}

fn relative_to(date: &DateTime<Local>, now: &DateTime<Local>) -> String {
    let duration = now.signed_duration_since(*date);

    if duration.num_seconds() < 0 {
        return "in the future".to_string();
    }

    let minutes = duration.num_minutes();
    let hours = duration.num_hours();
    let days = duration.num_days();

    if duration.num_seconds() < 60 {
        "a few seconds ago".to_string()
    } else if minutes == 1 {
        "a minute ago".to_string()
    } else if minutes < 60 {
        format!("{} minutes ago", minutes)
    } else if hours == 1 {
        "an hour ago".to_string()
    } else if hours < 24 {
        format!("{} hours ago", hours)
    } else if days == 1 {
        "yesterday".to_string()
    } else if days < 30 {
        format!("{} days ago", days)
    } else if days < 365 {
        match days / 30 {
            1 => "a month ago".to_string(),
            months => format!("{} months ago", months),
        }
    } else {
        match days / 365 {
            1 => "a year ago".to_string(),
            years => format!("{} years ago", years),
        }
    }
}

/// Generate a <time> HTML element for a backend timestamp
pub fn time_tag(ts: &str) -> String {
    match parse_timestamp(ts) {
        Some(date) => format!(
            r#"<time datetime="{}">{}</time>"#,
            date.to_rfc3339(),
            date.format("%B %-d, %Y")
        ),
        None => format!("<time>{}</time>", super::html_escape(ts)),
    }
}

/// Convert Moment.js format to chrono format
fn moment_to_chrono_format(format: &str) -> String {
    let replacements = [
        ("YYYY", "%Y"),
        ("YY", "%y"),
        ("MMMM", "%B"),
        ("MMM", "%b"),
        ("MM", "%m"),
        ("DDDD", "%j"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("hh", "%I"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("dddd", "%A"),
        ("ddd", "%a"),
        ("ZZ", "%z"),
        ("SSS", "%3f"),
    ];

    let mut result = format.to_string();
    for (from, to) in replacements {
        result = result.replace(from, to);
    }
    result
}
