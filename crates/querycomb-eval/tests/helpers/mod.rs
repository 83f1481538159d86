#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use querycomb_eval::{
    CollectingEmitter, Combiner, CompiledConfig, Emission, MemoryStore, Outcome, Record,
    SessionStore, StoreError, StoreResult,
};
use serde_json::Value;

pub struct Harness {
    pub combiner: Combiner,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<CollectingEmitter>,
}

impl Harness {
    pub fn feed(&self, record: Value, time: i64) -> Outcome {
        self.combiner.process_record(rec(record), time).unwrap()
    }

    pub fn emitted(&self) -> Vec<Emission> {
        self.sink.take()
    }

    pub fn open_sessions(&self) -> usize {
        let index = self.combiner.config().index_key().to_string();
        self.store.index_len(&index).unwrap()
    }

    pub fn is_open(&self, key: &str) -> bool {
        let blob = self.combiner.config().session_key(key);
        self.store.exists(&blob).unwrap()
    }
}

pub fn harness(yaml: &str) -> Harness {
    let config = Arc::new(CompiledConfig::from_yaml(yaml).unwrap());
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(CollectingEmitter::new());
    let combiner = Combiner::new(config, store.clone(), sink.clone());
    Harness {
        combiner,
        store,
        sink,
    }
}

pub fn rec(v: Value) -> Record {
    match v {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

/// Memory store whose operations fail transiently while `failing` is set.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub failures_left: AtomicU32,
    pub calls: AtomicU32,
    /// A command that fails on every call.
    pub broken: Option<&'static str>,
}

impl FlakyStore {
    pub fn failing(times: u32) -> Self {
        FlakyStore {
            failures_left: AtomicU32::new(times),
            ..Default::default()
        }
    }

    pub fn broken_on(command: &'static str) -> Self {
        FlakyStore {
            broken: Some(command),
            ..Default::default()
        }
    }

    fn gate(&self, command: &str) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken == Some(command) {
            return Err(StoreError::Connection(format!("{command}: connection reset")));
        }
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Command {
                command: command.to_string(),
                message: "LOADING".to_string(),
            });
        }
        Ok(())
    }
}

impl SessionStore for FlakyStore {
    fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.gate("SET")?;
        self.inner.set_with_expiry(key, value, ttl_secs)
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.gate("GET")?;
        self.inner.get(key)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.gate("EXISTS")?;
        self.inner.exists(key)
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        self.gate("EXPIRE")?;
        self.inner.expire(key, ttl_secs)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        self.gate("DEL")?;
        self.inner.delete(key)
    }

    fn index_upsert(&self, index: &str, member: &str, score: i64) -> StoreResult<()> {
        self.gate("ZADD")?;
        self.inner.index_upsert(index, member, score)
    }

    fn index_remove(&self, index: &str, member: &str) -> StoreResult<bool> {
        self.gate("ZREM")?;
        self.inner.index_remove(index, member)
    }

    fn index_remove_by_score(&self, index: &str, min: i64, max: i64) -> StoreResult<Vec<String>> {
        self.gate("ZREMRANGEBYSCORE")?;
        self.inner.index_remove_by_score(index, min, max)
    }

    fn index_retain_newest(&self, index: &str, keep: usize) -> StoreResult<Vec<String>> {
        self.gate("ZREMRANGEBYRANK")?;
        self.inner.index_retain_newest(index, keep)
    }

    fn index_len(&self, index: &str) -> StoreResult<usize> {
        self.gate("ZCARD")?;
        self.inner.index_len(index)
    }

    fn index_score(&self, index: &str, member: &str) -> StoreResult<Option<i64>> {
        self.gate("ZSCORE")?;
        self.inner.index_score(index, member)
    }
}
