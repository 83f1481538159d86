use thiserror::Error;

/// Errors that can occur while parsing a combiner configuration.
#[derive(Debug, Error)]
pub enum ConfigParseError {
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Condition parse error: {0}")]
    Condition(String),

    #[error("Time format parse error: {0}")]
    TimeFormat(String),

    #[error("SyntaxError at condition `{slot}`: {message}")]
    SlotCondition { slot: String, message: String },

    #[error("SyntaxError at replace condition `{slot}`: {message}")]
    Replace { slot: String, message: String },

    #[error("`{option}` configuration in {slot}: only allowed in `catch` and `dump`")]
    MisplacedOption { option: String, slot: String },

    #[error("Unknown configuration `{option}` in {slot}")]
    UnknownOption { option: String, slot: String },

    #[error("Must have <catch> and <dump> blocks (missing <{0}>)")]
    MissingBlock(String),

    #[error("Invalid value for `{option}`: {message}")]
    InvalidValue { option: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigParseError>;
