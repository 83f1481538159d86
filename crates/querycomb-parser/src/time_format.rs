//! Parser for the `time_format` expression.
//!
//! The expression names how the event time (`$time`) is rendered into a
//! slot's `time` field: `$time`, `string($time)`, `millis($time)`,
//! `iso8601($time)`, or `strftime($time, "%Y-%m-%d")`.

use pest::Parser;

use crate::ast::TimeFormat;
use crate::condition::{ExprParser, Rule, parse_string};
use crate::error::{ConfigParseError, Result};

/// Parse a time-format expression.
///
/// The strftime format string itself is not validated here; that happens when
/// the configuration is compiled into a formatter.
pub fn parse_time_format(input: &str) -> Result<TimeFormat> {
    let mut pairs = ExprParser::parse(Rule::time_format, input)
        .map_err(|e| ConfigParseError::TimeFormat(e.to_string()))?;

    let expr = pairs
        .next()
        .and_then(|tf| tf.into_inner().find(|p| p.as_rule() != Rule::EOI))
        .ok_or_else(|| ConfigParseError::TimeFormat(format!("empty expression: {input:?}")))?;

    match expr.as_rule() {
        Rule::time_ref => Ok(TimeFormat::Epoch),
        Rule::unary_call => {
            let func = expr
                .into_inner()
                .find(|p| p.as_rule() == Rule::time_fn)
                .map(|p| p.as_str())
                .unwrap_or_default();
            match func {
                "string" => Ok(TimeFormat::EpochString),
                "millis" => Ok(TimeFormat::EpochMillis),
                "iso8601" => Ok(TimeFormat::Iso8601),
                other => Err(ConfigParseError::TimeFormat(format!(
                    "unknown function '{other}'"
                ))),
            }
        }
        Rule::strftime_call => {
            let fmt_str = expr
                .into_inner()
                .find(|p| p.as_rule() == Rule::string)
                .map(parse_string)
                .unwrap_or_default();
            if fmt_str.is_empty() {
                return Err(ConfigParseError::TimeFormat(
                    "strftime format must not be empty".to_string(),
                ));
            }
            Ok(TimeFormat::Strftime(fmt_str))
        }
        other => unreachable!("unexpected time format rule: {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_time() {
        assert_eq!(parse_time_format("$time").unwrap(), TimeFormat::Epoch);
        assert_eq!(parse_time_format("  $time ").unwrap(), TimeFormat::Epoch);
    }

    #[test]
    fn test_unary_functions() {
        assert_eq!(
            parse_time_format("string($time)").unwrap(),
            TimeFormat::EpochString
        );
        assert_eq!(
            parse_time_format("millis( $time )").unwrap(),
            TimeFormat::EpochMillis
        );
        assert_eq!(
            parse_time_format("iso8601($time)").unwrap(),
            TimeFormat::Iso8601
        );
    }

    #[test]
    fn test_strftime() {
        assert_eq!(
            parse_time_format(r#"strftime($time, "%Y-%m-%d %H:%M:%S")"#).unwrap(),
            TimeFormat::Strftime("%Y-%m-%d %H:%M:%S".to_string())
        );
        assert_eq!(
            parse_time_format("strftime($time, '%s')").unwrap(),
            TimeFormat::Strftime("%s".to_string())
        );
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in [
            "",
            "time",
            "$tim",
            "upcase($time)",
            "strftime($time)",
            "strftime($time, '')",
            "$time + 1",
            "string($time",
        ] {
            assert!(parse_time_format(bad).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn test_display_matches_input_form() {
        for src in ["$time", "string($time)", "millis($time)", "iso8601($time)"] {
            assert_eq!(parse_time_format(src).unwrap().to_string(), src);
        }
    }
}
