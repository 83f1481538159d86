//! # querycomb-eval
//!
//! Session correlation engine for querycomb.
//!
//! This crate compiles a [`querycomb_parser::CombinerConfig`] and correlates
//! a stream of records into one combined record per session.
//!
//! ## Architecture
//!
//! - **Combiner** (batch path): extracts the session key, evaluates the
//!   `catch`, `prolong`, `dump`, `release` conditions in that order and
//!   applies the first match to the session store.
//! - **Reaper** (tokio task): periodically evicts sessions older than the
//!   TTL and trims the store to `buffer_size` sessions.
//! - **SessionStore**: TTL-aware key/value namespace plus a score-ordered
//!   index, backed by memory or Redis. Both paths reach it through a
//!   [`RetryStore`] and share nothing else.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use querycomb_eval::{
//!     CollectingEmitter, Combiner, CompiledConfig, MemoryStore, TaggedRecord,
//! };
//! use serde_json::json;
//!
//! let yaml = r#"
//! identify: host, pid
//! catch:
//!     condition: status == 'start'
//!     time: started_at
//! dump:
//!     condition: status == 'finish'
//!     time: finished_at
//! "#;
//!
//! let config = Arc::new(CompiledConfig::from_yaml(yaml).unwrap());
//! let sink = Arc::new(CollectingEmitter::new());
//! let combiner = Combiner::new(config, Arc::new(MemoryStore::new()), sink.clone());
//!
//! let batch = [
//!     (100, json!({"host": "db1", "pid": 7, "status": "start", "sql": "select 1"})),
//!     (105, json!({"host": "db1", "pid": 7, "status": "finish", "rows": 1})),
//! ]
//! .into_iter()
//! .map(|(time, v)| TaggedRecord {
//!     tag: "pg.log".to_string(),
//!     time,
//!     record: v.as_object().unwrap().clone(),
//! });
//!
//! let summary = combiner.process_batch(batch).unwrap();
//! assert_eq!(summary.emitted, 1);
//!
//! let out = sink.take();
//! assert_eq!(out[0].record["sql"], json!("select 1"));
//! assert_eq!(out[0].record["started_at"], json!(100));
//! assert_eq!(out[0].record["finished_at"], json!(105));
//! ```

pub mod condition;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod event;
pub mod key;
pub mod reaper;
pub mod store;
pub mod timestamp;
pub mod transform;

// Re-export the most commonly used types and functions at crate root
pub use condition::{CompiledCondition, compile_condition};
pub use config::{CompiledConfig, CompiledSlot};
pub use emitter::{CollectingEmitter, Emission, Emitter, JsonLinesEmitter};
pub use engine::{BatchSummary, Combiner, Outcome, TaggedRecord};
pub use error::{CombineError, Result};
pub use event::{Event, Record};
pub use key::{KEY_SEPARATOR, KeyExtractor};
pub use reaper::{Reaper, ReaperHandle, SweepStats};
pub use store::{
    MemoryStore, RedisStore, RetryStore, SessionStore, StoreError, StoreResult, open_store,
};
pub use timestamp::{event_time_or_now, extract_event_time, parse_timestamp_value};
pub use transform::{TimeFormatter, apply_replace, apply_time_field};
