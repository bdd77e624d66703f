//! Date-format capability for the engine's Joda-style patterns.
//!
//! The walker probes candidate formats with [`DateFormatter::for_format`];
//! anything that cannot be interpreted is rejected so the walker can drop it
//! with a diagnostic. The record decoder then parses hit values through the
//! surviving formats in declaration order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::StoreError;

/// Generic fallback format used when a mapping declares none, or when every
/// declared candidate is invalid.
pub const DEFAULT_DATE_FORMAT: &str = "date_optional_time";

/// A validated date format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormatter {
    name: String,
    kind: FormatKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FormatKind {
    /// ISO 8601 with optional time part.
    OptionalTime,
    /// A Joda-style pattern translated to a chrono strftime string.
    Pattern(String),
}

impl DateFormatter {
    /// Interpret a single format name or pattern. Errors on anything the
    /// capability cannot represent; the caller decides whether that is fatal.
    pub fn for_format(format: &str) -> Result<Self, StoreError> {
        let kind = match format {
            "date_optional_time" | "strict_date_optional_time" => FormatKind::OptionalTime,
            "date" | "strict_date" => FormatKind::Pattern("%Y-%m-%d".to_string()),
            "date_time" | "strict_date_time" => {
                FormatKind::Pattern("%Y-%m-%dT%H:%M:%S%.3f%z".to_string())
            }
            "date_time_no_millis" | "strict_date_time_no_millis" => {
                FormatKind::Pattern("%Y-%m-%dT%H:%M:%S%z".to_string())
            }
            "date_hour_minute_second" => FormatKind::Pattern("%Y-%m-%dT%H:%M:%S".to_string()),
            "basic_date" => FormatKind::Pattern("%Y%m%d".to_string()),
            "basic_date_time" => FormatKind::Pattern("%Y%m%dT%H%M%S%.3f%z".to_string()),
            pattern => FormatKind::Pattern(translate_pattern(pattern)?),
        };
        Ok(Self {
            name: format.to_string(),
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse a raw hit value into a UTC timestamp. Numbers are always read
    /// as epoch milliseconds regardless of the declared format.
    pub fn parse_value(&self, value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::Number(n) => {
                let millis = n.as_i64()?;
                Utc.timestamp_millis_opt(millis).single()
            }
            Value::String(s) => self.parse_str(s),
            _ => None,
        }
    }

    pub fn parse_str(&self, raw: &str) -> Option<DateTime<Utc>> {
        match &self.kind {
            FormatKind::OptionalTime => parse_optional_time(raw),
            FormatKind::Pattern(fmt) => {
                if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
                    return Some(dt.with_timezone(&Utc));
                }
                if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
                if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
                    return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
                }
                None
            }
        }
    }

    pub fn format(&self, dt: &DateTime<Utc>) -> String {
        match &self.kind {
            FormatKind::OptionalTime => dt.to_rfc3339(),
            FormatKind::Pattern(fmt) => dt.format(fmt).to_string(),
        }
    }
}

fn parse_optional_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Translate a Joda-style pattern (`yyyy-MM-dd HH:mm:ss.SSS`) to chrono
/// strftime. Unknown letter tokens make the whole pattern invalid.
fn translate_pattern(pattern: &str) -> Result<String, StoreError> {
    if pattern.is_empty() {
        return Err(StoreError::InvalidDateFormat(pattern.to_string()));
    }
    let mut out = String::with_capacity(pattern.len() + 4);
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            // quoted literal, '' is an escaped quote
            i += 1;
            while i < chars.len() && chars[i] != '\'' {
                push_literal(&mut out, chars[i]);
                i += 1;
            }
            i += 1;
            continue;
        }
        if !c.is_ascii_alphabetic() {
            push_literal(&mut out, c);
            i += 1;
            continue;
        }
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        let token = match (c, run) {
            ('y' | 'u', 4..) => "%Y",
            ('y' | 'u', 2) => "%y",
            ('y' | 'u', _) => "%Y",
            ('M', 2) => "%m",
            ('M', 1) => "%-m",
            ('M', 3) => "%b",
            ('M', _) => "%B",
            ('d', 2) => "%d",
            ('d', 1) => "%-d",
            ('D', _) => "%j",
            ('H', _) => "%H",
            ('h', _) => "%I",
            ('m', _) => "%M",
            ('s', _) => "%S",
            ('S', _) => "%3f",
            ('a', _) => "%p",
            ('E', _) => "%a",
            ('Z' | 'X' | 'x', _) => "%z",
            ('z', _) => "%Z",
            ('T', 1) => "T",
            _ => return Err(StoreError::InvalidDateFormat(pattern.to_string())),
        };
        out.push_str(token);
        i += run;
    }
    Ok(out)
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joda_date_pattern_translates_and_parses() {
        let fmt = DateFormatter::for_format("yyyy-MM-dd").unwrap();
        let parsed = fmt.parse_str("2023-07-14").unwrap();
        assert_eq!(parsed.timestamp(), 1_689_292_800);
    }

    #[test]
    fn datetime_pattern_round_trips() {
        let fmt = DateFormatter::for_format("yyyy-MM-dd HH:mm:ss").unwrap();
        let parsed = fmt.parse_str("2020-01-02 03:04:05").unwrap();
        assert_eq!(fmt.format(&parsed), "2020-01-02 03:04:05");
    }

    #[test]
    fn named_epoch_formats_are_rejected() {
        // the capability only understands named ISO formats and Joda
        // patterns; epoch_millis falls through to pattern translation
        // where 'e' and 'p' are unknown tokens
        assert!(DateFormatter::for_format("epoch_millis").is_err());
    }

    #[test]
    fn numeric_values_parse_as_epoch_millis() {
        let fmt = DateFormatter::for_format(DEFAULT_DATE_FORMAT).unwrap();
        let parsed = fmt.parse_value(&json!(1_700_000_000_000_i64)).unwrap();
        assert_eq!(parsed.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn optional_time_accepts_date_only_and_full_timestamps() {
        let fmt = DateFormatter::for_format("date_optional_time").unwrap();
        assert!(fmt.parse_str("2021-05-01").is_some());
        assert!(fmt.parse_str("2021-05-01T10:30:00Z").is_some());
        assert!(fmt.parse_str("not a date").is_none());
    }

    #[test]
    fn quoted_literals_survive_translation() {
        let fmt = DateFormatter::for_format("yyyy-MM-dd'T'HH:mm:ss").unwrap();
        assert!(fmt.parse_str("2022-03-04T05:06:07").is_some());
    }
}
