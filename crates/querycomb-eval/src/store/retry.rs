//! Retry wrapper over any session store.

use log::{debug, warn};

use super::{SessionStore, StoreResult};

/// Retries transient store failures a bounded number of times.
///
/// A call is attempted at most `retries + 1` times. Permanent errors
/// (see [`StoreError::is_transient`](super::StoreError::is_transient)) are returned immediately.
#[derive(Debug)]
pub struct RetryStore<S> {
    inner: S,
    retries: u32,
}

impl<S: SessionStore> RetryStore<S> {
    pub fn new(inner: S, retries: u32) -> Self {
        RetryStore { inner, retries }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn attempt<T>(
        &self,
        op: &str,
        target: &str,
        mut call: impl FnMut(&S) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut failures = 0u32;
        loop {
            match call(&self.inner) {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && failures < self.retries => {
                    failures += 1;
                    debug!(
                        "{} {op}({target}) failed, retry {failures}/{}: {e}",
                        self.inner.name(),
                        self.retries
                    );
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(
                            "{} {op}({target}) failed after {} attempts: {e}",
                            self.inner.name(),
                            failures + 1
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl<S: SessionStore> SessionStore for RetryStore<S> {
    fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.attempt("set", key, |s| s.set_with_expiry(key, value, ttl_secs))
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.attempt("get", key, |s| s.get(key))
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.attempt("exists", key, |s| s.exists(key))
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        self.attempt("expire", key, |s| s.expire(key, ttl_secs))
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        self.attempt("delete", key, |s| s.delete(key))
    }

    fn index_upsert(&self, index: &str, member: &str, score: i64) -> StoreResult<()> {
        self.attempt("index_upsert", member, |s| {
            s.index_upsert(index, member, score)
        })
    }

    fn index_remove(&self, index: &str, member: &str) -> StoreResult<bool> {
        self.attempt("index_remove", member, |s| s.index_remove(index, member))
    }

    fn index_remove_by_score(&self, index: &str, min: i64, max: i64) -> StoreResult<Vec<String>> {
        self.attempt("index_remove_by_score", index, |s| {
            s.index_remove_by_score(index, min, max)
        })
    }

    fn index_retain_newest(&self, index: &str, keep: usize) -> StoreResult<Vec<String>> {
        self.attempt("index_retain_newest", index, |s| {
            s.index_retain_newest(index, keep)
        })
    }

    fn index_len(&self, index: &str) -> StoreResult<usize> {
        self.attempt("index_len", index, |s| s.index_len(index))
    }

    fn index_score(&self, index: &str, member: &str) -> StoreResult<Option<i64>> {
        self.attempt("index_score", member, |s| s.index_score(index, member))
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
