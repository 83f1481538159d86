//! Record transforms applied on catch and dump.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, SecondsFormat};
use querycomb_parser::{ReplaceRule, TimeFormat};
use serde_json::Value;

use crate::error::{CombineError, Result};
use crate::event::Record;

/// Move each rule's source field to its destination, in order.
///
/// The destination is overwritten and the source removed. Rules whose source
/// is absent are skipped, so a later rule sees the effect of earlier ones.
pub fn apply_replace(record: &mut Record, rules: &[ReplaceRule]) {
    for rule in rules {
        if let Some(value) = record.remove(&rule.from) {
            record.insert(rule.to.clone(), value);
        }
    }
}

/// Set `record[dest]` to the formatted event time, when a destination is
/// configured.
pub fn apply_time_field(
    record: &mut Record,
    dest: Option<&str>,
    formatter: &TimeFormatter,
    event_time: i64,
) {
    if let Some(dest) = dest {
        record.insert(dest.to_string(), formatter.format(event_time));
    }
}

/// Renders an epoch-seconds timestamp per a configured [`TimeFormat`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeFormatter {
    format: TimeFormat,
}

impl TimeFormatter {
    /// Build a formatter, rejecting strftime strings chrono cannot render.
    pub fn new(format: TimeFormat) -> Result<Self> {
        if let TimeFormat::Strftime(fmt) = &format
            && StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error))
        {
            return Err(CombineError::InvalidTimeFormat(format!(
                "invalid strftime format {fmt:?}"
            )));
        }
        Ok(TimeFormatter { format })
    }

    pub fn time_format(&self) -> &TimeFormat {
        &self.format
    }

    /// Format `epoch_secs`. Text formats fall back to the integer when the
    /// timestamp is outside chrono's range.
    pub fn format(&self, epoch_secs: i64) -> Value {
        match &self.format {
            TimeFormat::Epoch => Value::from(epoch_secs),
            TimeFormat::EpochString => Value::String(epoch_secs.to_string()),
            TimeFormat::EpochMillis => Value::from(epoch_secs.saturating_mul(1000)),
            TimeFormat::Iso8601 => match DateTime::from_timestamp(epoch_secs, 0) {
                Some(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
                None => Value::from(epoch_secs),
            },
            TimeFormat::Strftime(fmt) => {
                let Some(dt) = DateTime::from_timestamp(epoch_secs, 0) else {
                    return Value::from(epoch_secs);
                };
                let mut out = String::new();
                match write!(out, "{}", dt.format_with_items(StrftimeItems::new(fmt))) {
                    Ok(()) => Value::String(out),
                    Err(_) => Value::from(epoch_secs),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(from: &str, to: &str) -> ReplaceRule {
        ReplaceRule {
            from: from.into(),
            to: to.into(),
        }
    }

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    // 2024-03-01T12:34:56Z
    const T: i64 = 1709296496;

    #[test]
    fn test_replace_moves_value() {
        let mut r = record(json!({"time": 10, "id": "a"}));
        apply_replace(&mut r, &[rule("time", "time_start")]);
        assert_eq!(r, record(json!({"time_start": 10, "id": "a"})));
    }

    #[test]
    fn test_replace_overwrites_destination() {
        let mut r = record(json!({"a": 1, "b": 2}));
        apply_replace(&mut r, &[rule("a", "b")]);
        assert_eq!(r, record(json!({"b": 1})));
    }

    #[test]
    fn test_replace_missing_source_skipped() {
        let mut r = record(json!({"b": 2}));
        apply_replace(&mut r, &[rule("a", "b")]);
        assert_eq!(r, record(json!({"b": 2})));
    }

    #[test]
    fn test_replace_applies_in_order() {
        // a => b then b => c chains through.
        let mut r = record(json!({"a": 1}));
        apply_replace(&mut r, &[rule("a", "b"), rule("b", "c")]);
        assert_eq!(r, record(json!({"c": 1})));

        // Swapping through the live record loses the second value.
        let mut r = record(json!({"a": 1, "b": 2}));
        apply_replace(&mut r, &[rule("a", "b"), rule("b", "a")]);
        assert_eq!(r, record(json!({"a": 1})));
    }

    #[test]
    fn test_replace_no_rules_is_noop() {
        let mut r = record(json!({"a": 1}));
        apply_replace(&mut r, &[]);
        assert_eq!(r, record(json!({"a": 1})));
    }

    #[test]
    fn test_time_field() {
        let f = TimeFormatter::default();
        let mut r = record(json!({}));
        apply_time_field(&mut r, Some("caught_at"), &f, T);
        assert_eq!(r["caught_at"], json!(T));

        let mut r = record(json!({}));
        apply_time_field(&mut r, None, &f, T);
        assert!(r.is_empty());
    }

    #[test]
    fn test_formats() {
        let f = |tf| TimeFormatter::new(tf).unwrap().format(T);
        assert_eq!(f(TimeFormat::Epoch), json!(T));
        assert_eq!(f(TimeFormat::EpochString), json!("1709296496"));
        assert_eq!(f(TimeFormat::EpochMillis), json!(1709296496000i64));
        assert_eq!(f(TimeFormat::Iso8601), json!("2024-03-01T12:34:56Z"));
        assert_eq!(
            f(TimeFormat::Strftime("%Y/%m/%d %H:%M".into())),
            json!("2024/03/01 12:34")
        );
    }

    #[test]
    fn test_invalid_strftime_rejected() {
        let err = TimeFormatter::new(TimeFormat::Strftime("%Y-%Q".into())).unwrap_err();
        assert!(matches!(err, CombineError::InvalidTimeFormat(_)), "got: {err}");
    }

    #[test]
    fn test_out_of_range_falls_back_to_integer() {
        let f = TimeFormatter::new(TimeFormat::Iso8601).unwrap();
        assert_eq!(f.format(i64::MAX), json!(i64::MAX));
    }
}
