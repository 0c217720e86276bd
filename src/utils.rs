use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};

/// Parses the timestamps found in GPX/KML files into unix seconds. Besides
/// RFC 3339, a few formats that loggers commonly write are accepted; times
/// without an offset are taken as UTC.
pub fn parse_time(input: &str) -> Option<i64> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.timestamp());
    }

    let mut s = input.to_string();
    if s.len() >= 10 && s.is_char_boundary(10) {
        let date = s[..10].replace('/', "-");
        s.replace_range(0..10, &date);
    }
    // "2024-01-01 10:00:00 +0800" -> "2024-01-01 10:00:00+0800"
    for sign in [" +", " -"] {
        if let Some(idx) = s.rfind(sign) {
            if idx >= 19 {
                s.remove(idx);
            }
        }
    }

    const WITH_OFFSET: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%z",
    ];
    const UTC_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];

    for fmt in WITH_OFFSET {
        if let Ok(dt) = DateTime::parse_from_str(&s, fmt) {
            if dt.year() >= 0 {
                return Some(dt.timestamp());
            }
        }
    }
    for fmt in UTC_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, fmt) {
            if dt.year() >= 0 {
                return Some(dt.and_utc().timestamp());
            }
        }
    }
    None
}

/// `2012-01-12T14:41:11Z`
pub fn format_time(timestamp: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}
