//! Background eviction of stale and excess sessions.
//!
//! Each tick removes index entries older than the TTL, trims the index to the
//! `buffer_size` most recent sessions, and deletes the blob of every removed
//! entry. The reaper shares nothing with the batch path except the store.
//!
//! ```text
//! ┌──────────┐  tick every remove_interval   ┌───────────────┐
//! │  Reaper  │ ────────────────────────────► │ SessionStore  │
//! └──────────┘                               └───────────────┘
//!      ▲
//!      │ broadcast::channel (shutdown signal)
//! ```

use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::CompiledConfig;
use crate::error::Result;
use crate::store::{RetryStore, SessionStore};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// Index entries older than the TTL.
    pub expired: usize,
    /// Index entries beyond `buffer_size`.
    pub trimmed: usize,
    /// Session blobs that still existed and were deleted.
    pub blobs_deleted: usize,
    /// Blob deletions that failed after retries. The blob's own expiry
    /// still removes it.
    pub delete_failures: usize,
}

impl SweepStats {
    pub fn removed(&self) -> usize {
        self.expired + self.trimmed
    }
}

/// Evicts sessions by age and count.
pub struct Reaper {
    config: Arc<CompiledConfig>,
    store: RetryStore<Arc<dyn SessionStore>>,
}

impl Reaper {
    /// Build a reaper. Store access is wrapped in a [`RetryStore`].
    pub fn new(config: Arc<CompiledConfig>, store: Arc<dyn SessionStore>) -> Self {
        let store = RetryStore::new(store, config.store.retry);
        Reaper { config, store }
    }

    /// Sweep as of the current wall clock.
    pub fn sweep(&self) -> Result<SweepStats> {
        self.sweep_at(Utc::now().timestamp())
    }

    /// Sweep as of `now` (epoch seconds).
    pub fn sweep_at(&self, now: i64) -> Result<SweepStats> {
        let index = self.config.index_key();
        let cutoff = now.saturating_sub_unsigned(self.config.ttl_secs);

        let mut stats = SweepStats::default();

        // Blobs of removed entries are deleted before the next index call, so
        // a failing trim cannot strand them.
        let expired = self.store.index_remove_by_score(index, i64::MIN, cutoff)?;
        stats.expired = expired.len();
        self.delete_blobs(&expired, &mut stats);

        let trimmed = self
            .store
            .index_retain_newest(index, self.config.buffer_size)?;
        stats.trimmed = trimmed.len();
        self.delete_blobs(&trimmed, &mut stats);

        Ok(stats)
    }

    fn delete_blobs(&self, members: &[String], stats: &mut SweepStats) {
        for member in members {
            match self.store.delete(&self.config.session_key(member)) {
                Ok(true) => stats.blobs_deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("failed to delete blob of evicted session {member}: {e}");
                    stats.delete_failures += 1;
                }
            }
        }
    }

    /// Run sweeps every `remove_interval` on the tokio runtime until the
    /// returned handle is shut down. The first sweep happens one interval
    /// after spawning.
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(reap_loop(Arc::new(self), shutdown_rx));
        ReaperHandle {
            handle,
            shutdown_tx,
        }
    }
}

async fn reap_loop(reaper: Arc<Reaper>, mut shutdown: broadcast::Receiver<()>) {
    let period = reaper.config.remove_interval;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("reaper started (interval: {period:?})");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Store calls block, so the sweep runs off the async workers.
                let worker = Arc::clone(&reaper);
                match tokio::task::spawn_blocking(move || worker.sweep()).await {
                    Ok(Ok(stats)) if stats.removed() > 0 => info!(
                        "reaped {} sessions ({} expired, {} over buffer)",
                        stats.removed(),
                        stats.expired,
                        stats.trimmed
                    ),
                    Ok(Ok(_)) => debug!("reaper tick: nothing to evict"),
                    Ok(Err(e)) => error!("reaper tick failed: {e}"),
                    Err(e) => error!("reaper tick panicked: {e}"),
                }
            }
            _ = shutdown.recv() => {
                break;
            }
        }
    }

    info!("reaper stopped");
}

/// Handle to a running reaper task.
pub struct ReaperHandle {
    handle: JoinHandle<()>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ReaperHandle {
    /// Stop scheduling ticks and wait for an in-flight tick to finish.
    pub async fn shutdown(self) {
        // A send error means the task already exited.
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            error!("reaper task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
