//! Event time extraction for ingestion front ends.
//!
//! Records carry their time in one of a few conventional fields, as epoch
//! seconds, epoch milliseconds, or ISO 8601 text. The combiner itself takes
//! the event time as an argument; this module is how a front end finds it.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::event::Event;

/// Epoch values above this are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// The first parseable timestamp among `fields`, in epoch seconds.
pub fn extract_event_time(event: &Event, fields: &[String]) -> Option<i64> {
    fields
        .iter()
        .filter_map(|f| event.get_field(f))
        .find_map(parse_timestamp_value)
}

/// Like [`extract_event_time`], falling back to the current wall clock.
pub fn event_time_or_now(event: &Event, fields: &[String]) -> i64 {
    extract_event_time(event, fields).unwrap_or_else(|| Utc::now().timestamp())
}

/// Parse a JSON number or string as epoch seconds.
pub fn parse_timestamp_value(val: &Value) -> Option<i64> {
    match val {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(normalize_epoch(i)),
            None => n.as_f64().map(|f| normalize_epoch(f as i64)),
        },
        Value::String(s) => parse_timestamp_string(s),
        _ => None,
    }
}

fn normalize_epoch(v: i64) -> i64 {
    if v > MILLIS_THRESHOLD { v / 1000 } else { v }
}

/// RFC 3339 first, then naive ISO 8601 forms taken as UTC.
fn parse_timestamp_string(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
    })
}
