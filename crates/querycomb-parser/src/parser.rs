//! YAML → AST parser for combiner configurations.
//!
//! Handles:
//! - Top-level options with defaults (`identify`, `ttl`, `buffer_size`, ...)
//! - The four lifecycle blocks (`catch`, `prolong`, `dump`, `release`)
//! - `replace` rule lists (`src => dst, ...`) and per-slot `time` keys
//! - The `time_format` expression

use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;

use crate::ast::*;
use crate::condition::parse_condition;
use crate::error::{ConfigParseError, Result};
use crate::time_format::parse_time_format;

// =============================================================================
// Defaults
// =============================================================================

pub const DEFAULT_KEY_PREFIX: &str = "query_combiner:";
pub const DEFAULT_IDENTIFY: &str = "session-id";
pub const DEFAULT_TTL_SECS: u64 = 1800;
pub const DEFAULT_BUFFER_SIZE: usize = 1000;
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_REMOVE_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_TAG: &str = "query_combiner";
pub const DEFAULT_STORE_RETRY: u32 = 3;

// =============================================================================
// Raw YAML shape
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RawConfig {
    store: StoreBackend,
    host: String,
    port: u16,
    db_index: u32,
    store_retry: u32,
    key_prefix: String,
    identify: IdentifySpec,
    ttl: u64,
    buffer_size: usize,
    continuous_dump: bool,
    time_format: String,
    flush_interval: u64,
    remove_interval: u64,
    tag: String,
    timestamp_fields: Vec<String>,
    catch: Option<Value>,
    prolong: Option<Value>,
    dump: Option<Value>,
    release: Option<Value>,
}

impl Default for RawConfig {
    fn default() -> Self {
        RawConfig {
            store: StoreBackend::Memory,
            host: "localhost".to_string(),
            port: 6379,
            db_index: 0,
            store_retry: DEFAULT_STORE_RETRY,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            identify: IdentifySpec::Csv(DEFAULT_IDENTIFY.to_string()),
            ttl: DEFAULT_TTL_SECS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            continuous_dump: false,
            time_format: "$time".to_string(),
            flush_interval: DEFAULT_FLUSH_INTERVAL_SECS,
            remove_interval: DEFAULT_REMOVE_INTERVAL_SECS,
            tag: DEFAULT_TAG.to_string(),
            timestamp_fields: vec![
                "@timestamp".to_string(),
                "timestamp".to_string(),
                "time".to_string(),
            ],
            catch: None,
            prolong: None,
            dump: None,
            release: None,
        }
    }
}

/// `identify` accepts `"a, b"` or a YAML list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdentifySpec {
    Csv(String),
    List(Vec<String>),
}

impl IdentifySpec {
    fn into_fields(self) -> Vec<String> {
        let raw = match self {
            IdentifySpec::Csv(s) => s.split(',').map(str::to_string).collect(),
            IdentifySpec::List(list) => list,
        };
        raw.into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect()
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Parse a YAML string into a validated combiner configuration.
pub fn parse_config_yaml(yaml: &str) -> Result<CombinerConfig> {
    let raw: RawConfig = if yaml.trim().is_empty() {
        RawConfig::default()
    } else {
        serde_yaml::from_str(yaml)?
    };

    let identify = raw.identify.into_fields();
    if identify.is_empty() {
        return Err(invalid("identify", "at least one field name is required"));
    }
    for (option, value) in [
        ("ttl", raw.ttl),
        ("buffer_size", raw.buffer_size as u64),
        ("flush_interval", raw.flush_interval),
        ("remove_interval", raw.remove_interval),
    ] {
        if value == 0 {
            return Err(invalid(option, "must be greater than zero"));
        }
    }
    if i64::try_from(raw.buffer_size).is_err() {
        return Err(invalid("buffer_size", "must not exceed 9223372036854775807"));
    }
    if raw.key_prefix.is_empty() {
        return Err(invalid("key_prefix", "must not be empty"));
    }

    let time_format = parse_time_format(&raw.time_format)?;

    let catch = parse_slot(SlotKind::Catch, raw.catch.as_ref())?;
    let prolong = parse_slot(SlotKind::Prolong, raw.prolong.as_ref())?;
    let dump = parse_slot(SlotKind::Dump, raw.dump.as_ref())?;
    let release = parse_slot(SlotKind::Release, raw.release.as_ref())?;

    let Some(catch) = catch else {
        return Err(ConfigParseError::MissingBlock("catch".to_string()));
    };
    let Some(dump) = dump else {
        return Err(ConfigParseError::MissingBlock("dump".to_string()));
    };

    Ok(CombinerConfig {
        store: StoreSettings {
            backend: raw.store,
            host: raw.host,
            port: raw.port,
            db_index: raw.db_index,
            retry: raw.store_retry,
        },
        key_prefix: raw.key_prefix,
        identify,
        ttl_secs: raw.ttl,
        buffer_size: raw.buffer_size,
        continuous_dump: raw.continuous_dump,
        time_format,
        flush_interval_secs: raw.flush_interval,
        remove_interval_secs: raw.remove_interval,
        tag: raw.tag,
        timestamp_fields: raw.timestamp_fields,
        catch,
        prolong,
        dump,
        release,
    })
}

/// Parse a configuration file from a path.
pub fn parse_config_file(path: &Path) -> Result<CombinerConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config_yaml(&content)
}

/// Parse a `replace` option: comma-separated `src => dst` pairs.
///
/// Rules keep their configured order.
pub fn parse_replace_rules(slot: SlotKind, input: &str) -> Result<Vec<ReplaceRule>> {
    let syntax_error = |message: String| ConfigParseError::Replace {
        slot: slot.to_string(),
        message,
    };

    let mut rules = Vec::new();
    for part in input.split(',') {
        let Some((from, to)) = part.split_once("=>") else {
            return Err(syntax_error(format!("expected `src => dst`, got {part:?}")));
        };
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() || to.contains("=>") {
            return Err(syntax_error(format!("expected `src => dst`, got {part:?}")));
        }
        rules.push(ReplaceRule {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    if rules.is_empty() {
        return Err(syntax_error("no rules given".to_string()));
    }
    Ok(rules)
}

// =============================================================================
// Slot blocks
// =============================================================================

/// Parse one lifecycle block.
///
/// Returns `None` when the block is absent or defines no `condition`; the
/// caller decides whether that slot was mandatory.
fn parse_slot(kind: SlotKind, block: Option<&Value>) -> Result<Option<SlotConfig>> {
    let Some(block) = block else {
        return Ok(None);
    };
    if block.is_null() {
        return Ok(None);
    }
    let mapping = block.as_mapping().ok_or_else(|| {
        invalid(kind.as_str(), "block must be a mapping of options")
    })?;

    let mut condition = None;
    let mut replace = Vec::new();
    let mut time_key = None;

    for (key, value) in mapping {
        let option = key.as_str().unwrap_or_default();
        match option {
            "condition" => {
                let source = scalar_text(value).ok_or_else(|| {
                    invalid(&format!("{kind}.condition"), "must be a string")
                })?;
                let expr =
                    parse_condition(&source).map_err(|e| ConfigParseError::SlotCondition {
                        slot: kind.to_string(),
                        message: e.to_string(),
                    })?;
                condition = Some((source, expr));
            }
            "replace" | "time" if !kind.transforms_record() => {
                return Err(ConfigParseError::MisplacedOption {
                    option: option.to_string(),
                    slot: kind.to_string(),
                });
            }
            "replace" => {
                let source = scalar_text(value)
                    .ok_or_else(|| invalid(&format!("{kind}.replace"), "must be a string"))?;
                replace = parse_replace_rules(kind, &source)?;
            }
            "time" => {
                let dest = scalar_text(value)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| {
                        invalid(&format!("{kind}.time"), "must be a non-empty field name")
                    })?;
                time_key = Some(dest);
            }
            _ => {
                return Err(ConfigParseError::UnknownOption {
                    option: yaml_key_text(key),
                    slot: kind.to_string(),
                });
            }
        }
    }

    Ok(condition.map(|(source, condition)| SlotConfig {
        kind,
        source,
        condition,
        replace,
        time_key,
    }))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn yaml_key_text(key: &Value) -> String {
    scalar_text(key).unwrap_or_else(|| format!("{key:?}"))
}

fn invalid(option: &str, message: &str) -> ConfigParseError {
    ConfigParseError::InvalidValue {
        option: option.to_string(),
        message: message.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
