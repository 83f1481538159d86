//! Lifecycle controller.
//!
//! The `Combiner` classifies each record against the configured slots and
//! applies the matching action to the session store: catch opens a session,
//! prolong refreshes it, dump merges and emits, release discards.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use querycomb_parser::SlotKind;
use serde::Serialize;
use serde_json::Value;

use crate::config::{CompiledConfig, CompiledSlot};
use crate::emitter::{Emission, Emitter};
use crate::error::{CombineError, Result};
use crate::event::{Event, Record};
use crate::store::{RetryStore, SessionStore};
use crate::transform::{apply_replace, apply_time_field};

/// What processing one record did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Outcome {
    /// An identify field was missing.
    NoKey,
    /// No slot condition held.
    Unmatched,
    Caught,
    /// `refreshed` is false when no session was open.
    Prolonged { refreshed: bool },
    /// `emitted` is false when no session was open.
    Dumped { emitted: bool },
    Released,
}

/// A record as delivered by an ingestion front end.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedRecord {
    pub tag: String,
    /// Event time in epoch seconds.
    pub time: i64,
    pub record: Record,
}

/// Per-batch outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub records: usize,
    pub no_key: usize,
    pub unmatched: usize,
    pub caught: usize,
    pub prolonged: usize,
    pub dumped: usize,
    pub emitted: usize,
    pub released: usize,
}

impl BatchSummary {
    pub fn add(&mut self, outcome: Outcome) {
        self.records += 1;
        match outcome {
            Outcome::NoKey => self.no_key += 1,
            Outcome::Unmatched => self.unmatched += 1,
            Outcome::Caught => self.caught += 1,
            Outcome::Prolonged { .. } => self.prolonged += 1,
            Outcome::Dumped { emitted } => {
                self.dumped += 1;
                if emitted {
                    self.emitted += 1;
                }
            }
            Outcome::Released => self.released += 1,
        }
    }

    /// Fold another batch's counters into this one.
    pub fn merge(&mut self, other: &BatchSummary) {
        self.records += other.records;
        self.no_key += other.no_key;
        self.unmatched += other.unmatched;
        self.caught += other.caught;
        self.prolonged += other.prolonged;
        self.dumped += other.dumped;
        self.emitted += other.emitted;
        self.released += other.released;
    }
}

/// Correlates records into combined session records.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use querycomb_eval::{Combiner, CollectingEmitter, CompiledConfig, MemoryStore};
/// use serde_json::json;
///
/// let yaml = r#"
/// identify: id
/// catch:
///     condition: status == 'start'
///     replace: time => time_start
/// dump:
///     condition: status == 'finish'
///     replace: time => time_finish
/// "#;
///
/// let config = Arc::new(CompiledConfig::from_yaml(yaml).unwrap());
/// let sink = Arc::new(CollectingEmitter::new());
/// let combiner = Combiner::new(config, Arc::new(MemoryStore::new()), sink.clone());
///
/// let start = json!({"id": "q1", "status": "start", "time": 10});
/// let finish = json!({"id": "q1", "status": "finish", "time": 12});
/// combiner.process_record(start.as_object().unwrap().clone(), 10).unwrap();
/// combiner.process_record(finish.as_object().unwrap().clone(), 12).unwrap();
///
/// let emitted = sink.take();
/// assert_eq!(emitted.len(), 1);
/// assert_eq!(emitted[0].record["time_start"], json!(10));
/// assert_eq!(emitted[0].record["time_finish"], json!(12));
/// ```
pub struct Combiner {
    config: Arc<CompiledConfig>,
    store: RetryStore<Arc<dyn SessionStore>>,
    emitter: Arc<dyn Emitter>,
}

impl Combiner {
    /// Build a combiner. Store access is wrapped in a [`RetryStore`] using
    /// the configured retry count.
    pub fn new(
        config: Arc<CompiledConfig>,
        store: Arc<dyn SessionStore>,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        let store = RetryStore::new(store, config.store.retry);
        Combiner {
            config,
            store,
            emitter,
        }
    }

    pub fn config(&self) -> &Arc<CompiledConfig> {
        &self.config
    }

    /// Process a batch in order.
    ///
    /// Stops at the first failing record. Records before it stay applied and
    /// the error reports how many were processed.
    pub fn process_batch<I>(&self, batch: I) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = TaggedRecord>,
    {
        let mut summary = BatchSummary::default();
        for item in batch {
            match self.process_record(item.record, item.time) {
                Ok(outcome) => summary.add(outcome),
                Err(e) => {
                    return Err(CombineError::BatchAborted {
                        processed: summary.records,
                        source: Box::new(e),
                    });
                }
            }
        }
        Ok(summary)
    }

    /// Classify one record and apply its action.
    pub fn process_record(&self, record: Record, event_time: i64) -> Result<Outcome> {
        let Some(key) = self.config.key_extractor.extract(&Event::new(&record)) else {
            return Ok(Outcome::NoKey);
        };

        let event = Event::new(&record);
        let Some(slot) = self
            .config
            .slots
            .iter()
            .find(|slot| slot.condition.matches(&event))
        else {
            return Ok(Outcome::Unmatched);
        };

        match slot.kind {
            SlotKind::Catch => self.catch(slot, &key, record, event_time),
            SlotKind::Prolong => self.prolong(&key, event_time),
            SlotKind::Dump => self.dump(slot, &key, record, event_time),
            SlotKind::Release => self.release(&key).map(|()| Outcome::Released),
        }
    }

    fn catch(
        &self,
        slot: &CompiledSlot,
        key: &str,
        mut record: Record,
        event_time: i64,
    ) -> Result<Outcome> {
        self.transform(slot, &mut record, event_time);
        let blob = serde_json::to_string(&record)?;
        self.store
            .set_with_expiry(&self.config.session_key(key), &blob, self.config.ttl_secs)?;
        self.store
            .index_upsert(self.config.index_key(), key, event_time)?;
        debug!("catch {key}");
        Ok(Outcome::Caught)
    }

    fn prolong(&self, key: &str, event_time: i64) -> Result<Outcome> {
        let refreshed = self.refresh(key, event_time)?;
        debug!("prolong {key} (open: {refreshed})");
        Ok(Outcome::Prolonged { refreshed })
    }

    fn dump(
        &self,
        slot: &CompiledSlot,
        key: &str,
        mut record: Record,
        event_time: i64,
    ) -> Result<Outcome> {
        let blob_key = self.config.session_key(key);
        let Some(blob) = self.store.get(&blob_key)? else {
            debug!("dump {key}: no open session");
            return Ok(Outcome::Dumped { emitted: false });
        };
        let Ok(Value::Object(mut combined)) = serde_json::from_str::<Value>(&blob) else {
            warn!("discarding session {key}: stored state is not a JSON object");
            self.release(key)?;
            return Ok(Outcome::Dumped { emitted: false });
        };

        self.transform(slot, &mut record, event_time);
        combined.extend(record);

        self.emitter.emit(Emission {
            tag: self.config.tag.clone(),
            time: Utc::now().timestamp(),
            record: combined,
        })?;

        if self.config.continuous_dump {
            self.refresh(key, event_time)?;
            debug!("dump {key} (continuous)");
        } else {
            self.release(key)?;
            debug!("dump {key}");
        }
        Ok(Outcome::Dumped { emitted: true })
    }

    fn release(&self, key: &str) -> Result<()> {
        self.store.delete(&self.config.session_key(key))?;
        self.store.index_remove(self.config.index_key(), key)?;
        debug!("release {key}");
        Ok(())
    }

    /// Renew TTL and bump the index score if the session is open.
    fn refresh(&self, key: &str, event_time: i64) -> Result<bool> {
        if !self
            .store
            .expire(&self.config.session_key(key), self.config.ttl_secs)?
        {
            return Ok(false);
        }
        self.store
            .index_upsert(self.config.index_key(), key, event_time)?;
        Ok(true)
    }

    fn transform(&self, slot: &CompiledSlot, record: &mut Record, event_time: i64) {
        apply_replace(record, &slot.replace);
        apply_time_field(
            record,
            slot.time_key.as_deref(),
            &self.config.formatter,
            event_time,
        );
    }
}
