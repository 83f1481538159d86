//! Evaluation-specific error types.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while compiling a configuration or combining records.
#[derive(Debug, Error)]
pub enum CombineError {
    /// A parser error propagated during compilation.
    #[error("parser error: {0}")]
    Parser(#[from] querycomb_parser::ConfigParseError),

    /// A `=~`/`!~` pattern failed to compile.
    #[error("invalid regex pattern: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// A strftime format string contains an invalid specifier.
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),

    /// A store operation failed (after retries, where applicable).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Session state could not be serialized.
    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The downstream sink rejected an emitted record.
    #[error("emit error: {0}")]
    Emit(String),

    /// A batch stopped at a failing record; earlier records stay applied.
    #[error("batch aborted after {processed} records: {source}")]
    BatchAborted {
        processed: usize,
        #[source]
        source: Box<CombineError>,
    },
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CombineError>;
