//! In-process session store.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{SessionStore, StoreResult};

/// Store backed by process memory.
///
/// Values expire lazily: a value past its deadline is dropped the next time
/// it is touched. Indexes keep a score map plus a `(score, member)` set so
/// range and rank removals walk members in score order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    values: HashMap<String, Entry>,
    indexes: HashMap<String, Index>,
}

#[derive(Debug)]
struct Entry {
    value: String,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct Index {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl Index {
    fn upsert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(score, member.to_string()));
                true
            }
            None => false,
        }
    }

    fn drain_members(&mut self, victims: Vec<(i64, String)>) -> Vec<String> {
        victims
            .into_iter()
            .map(|entry| {
                self.ordered.remove(&entry);
                self.scores.remove(&entry.1);
                entry.1
            })
            .collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time left before `key` expires, or `None` if it is absent.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let mut state = self.lock();
        state
            .live_entry(key, Instant::now())
            .map(|e| e.deadline.saturating_duration_since(Instant::now()))
    }

    /// Number of unexpired values.
    pub fn value_count(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values
            .values()
            .filter(|e| e.deadline > now)
            .count()
    }

    /// Members of `index` in ascending score order.
    pub fn index_members(&self, index: &str) -> Vec<(String, i64)> {
        self.lock()
            .indexes
            .get(index)
            .map(|idx| {
                idx.ordered
                    .iter()
                    .map(|(score, member)| (member.clone(), *score))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl State {
    fn live_entry(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        let expired = self.values.get(key).is_some_and(|e| e.deadline <= now);
        if expired {
            self.values.remove(key);
            return None;
        }
        self.values.get_mut(key)
    }
}

fn deadline(ttl_secs: u64) -> Instant {
    let now = Instant::now();
    now.checked_add(Duration::from_secs(ttl_secs)).unwrap_or(now)
}

impl SessionStore for MemoryStore {
    fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.lock().values.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                deadline: deadline(ttl_secs),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .lock()
            .live_entry(key, Instant::now())
            .map(|e| e.value.clone()))
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.lock().live_entry(key, Instant::now()).is_some())
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        let mut state = self.lock();
        match state.live_entry(key, Instant::now()) {
            Some(entry) => {
                entry.deadline = deadline(ttl_secs);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut state = self.lock();
        let live = state.live_entry(key, Instant::now()).is_some();
        state.values.remove(key);
        Ok(live)
    }

    fn index_upsert(&self, index: &str, member: &str, score: i64) -> StoreResult<()> {
        self.lock()
            .indexes
            .entry(index.to_string())
            .or_default()
            .upsert(member, score);
        Ok(())
    }

    fn index_remove(&self, index: &str, member: &str) -> StoreResult<bool> {
        Ok(self
            .lock()
            .indexes
            .get_mut(index)
            .is_some_and(|idx| idx.remove(member)))
    }

    fn index_remove_by_score(&self, index: &str, min: i64, max: i64) -> StoreResult<Vec<String>> {
        if min > max {
            return Ok(Vec::new());
        }
        let mut state = self.lock();
        let Some(idx) = state.indexes.get_mut(index) else {
            return Ok(Vec::new());
        };
        let victims: Vec<(i64, String)> = idx
            .ordered
            .iter()
            .skip_while(|(score, _)| *score < min)
            .take_while(|(score, _)| *score <= max)
            .cloned()
            .collect();
        Ok(idx.drain_members(victims))
    }

    fn index_retain_newest(&self, index: &str, keep: usize) -> StoreResult<Vec<String>> {
        let mut state = self.lock();
        let Some(idx) = state.indexes.get_mut(index) else {
            return Ok(Vec::new());
        };
        let excess = idx.ordered.len().saturating_sub(keep);
        let victims: Vec<(i64, String)> = idx.ordered.iter().take(excess).cloned().collect();
        Ok(idx.drain_members(victims))
    }

    fn index_len(&self, index: &str) -> StoreResult<usize> {
        Ok(self.lock().indexes.get(index).map_or(0, |idx| idx.scores.len()))
    }

    fn index_score(&self, index: &str, member: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .lock()
            .indexes
            .get(index)
            .and_then(|idx| idx.scores.get(member).copied()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
