use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;

static TEXT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(\d{4})\s*[年/\-.]\s*(\d{1,2})\s*[月/\-.]\s*(\d{1,2})\s*日?(?:\s*(\d{1,2}):(\d{2}))?",
    )
    .expect("date pattern compiles")
});

/// Normalised posting time. `fault` marks a value that must not be used;
/// a faulted date carries neither timestamp nor calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostedDate {
    pub timestamp_ms: Option<i64>,
    pub ymd: Option<String>,
    pub fault: bool,
}

impl PostedDate {
    pub fn fault() -> Self {
        Self {
            timestamp_ms: None,
            ymd: None,
            fault: true,
        }
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            timestamp_ms: Some(at.timestamp_millis()),
            ymd: Some(at.format("%Y/%m/%d").to_string()),
            fault: false,
        }
    }

    /// Epoch seconds as carried in an attribute, e.g. `ts="1609459200"`.
    pub fn from_epoch_seconds(raw: &str) -> Self {
        raw.trim()
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(Self::from_datetime)
            .unwrap_or_else(Self::fault)
    }

    /// First `YYYY年MM月DD日 HH:MM` style date in free text (separators `/`, `-`
    /// and `.` work too; the time is optional). Read as UTC.
    pub fn from_text(raw: &str) -> Self {
        parse_text(raw)
            .map(Self::from_datetime)
            .unwrap_or_else(Self::fault)
    }
}

fn parse_text(raw: &str) -> Option<DateTime<Utc>> {
    let caps = TEXT_DATE.captures(raw)?;
    let number = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());

    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, number(2)?, number(3)?)?;
    let (hour, minute) = match (number(4), number(5)) {
        (Some(h), Some(m)) => (h, m),
        _ => (0, 0),
    };
    Some(date.and_hms_opt(hour, minute, 0)?.and_utc())
}
