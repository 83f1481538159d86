//! Session store contract and implementations.
//!
//! A store holds one serialized blob per open session, keyed by
//! `prefix + session_key`, plus an ordered index under the bare `prefix`
//! mapping each session key to its last-touch time in epoch seconds.
//!
//! Every operation is individually atomic. The engine and the reaper share a
//! store only through these operations and always reach it through a
//! [`RetryStore`].

mod memory;
mod redis_store;
mod retry;

use std::sync::Arc;

use querycomb_parser::{StoreBackend, StoreSettings};
use thiserror::Error;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use retry::RetryStore;

/// Errors reported by a session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store rejected or failed a command.
    #[error("store command `{command}` failed: {message}")]
    Command { command: String, message: String },

    /// The store could not be reached.
    #[error("store connection error: {0}")]
    Connection(String),

    /// The store returned a reply of an unexpected shape.
    #[error("unexpected store reply: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Command { .. } | StoreError::Connection(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Open the configured backend.
pub fn open_store(settings: &StoreSettings) -> StoreResult<Arc<dyn SessionStore>> {
    match settings.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Redis => Ok(Arc::new(RedisStore::connect(&settings.url())?)),
    }
}

/// Key/value namespace with expiry plus a score-ordered index.
pub trait SessionStore: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl_secs`.
    fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Renew the expiry of an existing key. Returns false if the key is absent.
    fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool>;

    /// Returns whether a value was removed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Insert `member` into `index` or update its score.
    fn index_upsert(&self, index: &str, member: &str, score: i64) -> StoreResult<()>;

    /// Returns whether the member was present.
    fn index_remove(&self, index: &str, member: &str) -> StoreResult<bool>;

    /// Remove every member with `min <= score <= max`, returning them.
    fn index_remove_by_score(&self, index: &str, min: i64, max: i64) -> StoreResult<Vec<String>>;

    /// Keep only the `keep` highest-scored members, returning the removed ones.
    fn index_retain_newest(&self, index: &str, keep: usize) -> StoreResult<Vec<String>>;

    fn index_len(&self, index: &str) -> StoreResult<usize>;

    fn index_score(&self, index: &str, member: &str) -> StoreResult<Option<i64>>;

    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str {
        "store"
    }
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
    fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        (**self).set_with_expiry(key, value, ttl_secs)
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        (**self).exists(key)
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        (**self).expire(key, ttl_secs)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        (**self).delete(key)
    }

    fn index_upsert(&self, index: &str, member: &str, score: i64) -> StoreResult<()> {
        (**self).index_upsert(index, member, score)
    }

    fn index_remove(&self, index: &str, member: &str) -> StoreResult<bool> {
        (**self).index_remove(index, member)
    }

    fn index_remove_by_score(&self, index: &str, min: i64, max: i64) -> StoreResult<Vec<String>> {
        (**self).index_remove_by_score(index, min, max)
    }

    fn index_retain_newest(&self, index: &str, keep: usize) -> StoreResult<Vec<String>> {
        (**self).index_retain_newest(index, keep)
    }

    fn index_len(&self, index: &str) -> StoreResult<usize> {
        (**self).index_len(index)
    }

    fn index_score(&self, index: &str, member: &str) -> StoreResult<Option<i64>> {
        (**self).index_score(index, member)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
