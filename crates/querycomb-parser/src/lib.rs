//! # querycomb-parser
//!
//! Parser for querycomb combiner configurations.
//!
//! A configuration describes how to correlate a stream of records into
//! session-scoped combined records: which fields identify a session, and four
//! lifecycle slots (`catch`, `prolong`, `dump`, `release`) whose conditions
//! classify each record.
//!
//! This crate turns configuration text into a strongly-typed AST, handling:
//!
//! - **Slot conditions**: field comparisons (`==`, `!=`, `<`, `<=`, `>`, `>=`),
//!   regex matches (`=~`, `!~`), `and`/`or`/`xor`/`not`, parentheses
//! - **Replace rules**: ordered `src => dst` field renames for `catch`/`dump`
//! - **Time formats**: `$time`, `string($time)`, `millis($time)`,
//!   `iso8601($time)`, `strftime($time, "...")`
//! - **Validation**: every misplaced, unknown, or malformed option is a
//!   configuration error naming the offending block
//!
//! ## Architecture
//!
//! - **PEG grammar** ([`pest`]) for conditions and time formats, with Pratt
//!   parsing for connective precedence (`NOT` > `AND` > `OR`/`XOR`)
//! - **serde_yaml** for the configuration file structure
//!
//! ## Quick Start
//!
//! ```rust
//! use querycomb_parser::parse_config_yaml;
//!
//! let yaml = r#"
//! identify: id
//! catch:
//!     condition: status == 'start'
//!     replace: time => time_start
//! dump:
//!     condition: status == 'finish'
//!     replace: time => time_finish
//! "#;
//!
//! let config = parse_config_yaml(yaml).unwrap();
//! assert_eq!(config.identify, vec!["id"]);
//! assert_eq!(config.catch.condition.fields(), vec!["status"]);
//! ```

pub mod ast;
pub mod condition;
pub mod error;
pub mod parser;
pub mod time_format;

// Re-export the most commonly used types and functions at crate root
pub use ast::{
    CombinerConfig, CompareOp, ConditionExpr, Literal, Operand, ReplaceRule, SlotConfig,
    SlotKind, StoreBackend, StoreSettings, TimeFormat,
};
pub use condition::parse_condition;
pub use error::{ConfigParseError, Result};
pub use parser::{parse_config_file, parse_config_yaml, parse_replace_rules};
pub use time_format::parse_time_format;
