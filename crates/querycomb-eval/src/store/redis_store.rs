//! Redis-backed session store.
//!
//! Values are plain strings set with `EX`; the index is a sorted set. Range
//! and rank removals read the members and remove them in one `MULTI`/`EXEC`
//! pipeline so the returned list matches what was removed.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info};
use redis::{Client, Connection, ErrorKind, FromRedisValue, RedisError};

use super::{SessionStore, StoreError, StoreResult};

/// Session store speaking to a Redis server.
pub struct RedisStore {
    client: Client,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .finish()
    }
}

impl RedisStore {
    /// Connect to `redis://host:port/db`.
    pub fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = client
            .get_connection()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!("connected to redis at {url}");
        Ok(RedisStore {
            client,
            conn: Mutex::new(Some(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the shared connection, reconnecting first if the last
    /// call dropped it.
    fn with_conn<T>(
        &self,
        command: &str,
        f: impl FnOnce(&mut Connection) -> Result<T, RedisError>,
    ) -> StoreResult<T> {
        let mut guard = self.lock();
        if guard.is_none() {
            debug!("reconnecting to redis");
            let fresh = self
                .client
                .get_connection()
                .map_err(|e| StoreError::Connection(e.to_string()))?;
            *guard = Some(fresh);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Connection("no connection".to_string()));
        };
        f(conn).map_err(|e| {
            let err = classify(command, e);
            if matches!(err, StoreError::Connection(_)) {
                *guard = None;
            }
            err
        })
    }
}

fn classify(command: &str, e: RedisError) -> StoreError {
    if e.is_connection_dropped() || e.is_io_error() || e.is_connection_refusal() || e.is_timeout()
    {
        StoreError::Connection(e.to_string())
    } else if e.kind() == ErrorKind::TypeError {
        StoreError::Decode(format!("{command}: {e}"))
    } else {
        StoreError::Command {
            command: command.to_string(),
            message: e.to_string(),
        }
    }
}

fn query<T: FromRedisValue>(cmd: &redis::Cmd, conn: &mut Connection) -> Result<T, RedisError> {
    cmd.query(conn)
}

/// Last rank to drop so that `keep` newest members remain. Ranks ascend by
/// score, so everything up to rank `-(keep + 1)` goes. `None` when `keep`
/// exceeds any possible sorted-set size.
fn trim_stop(keep: usize) -> Option<i64> {
    i64::try_from(keep).ok().map(|keep| -keep - 1)
}

/// Sorted-set bound for a score, using `-inf` for the open lower end.
fn score_bound(score: i64) -> String {
    if score == i64::MIN {
        "-inf".to_string()
    } else {
        score.to_string()
    }
}

impl SessionStore for RedisStore {
    fn set_with_expiry(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.with_conn("SET", |c| {
            query(
                redis::cmd("SET").arg(key).arg(value).arg("EX").arg(ttl_secs),
                c,
            )
        })
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_conn("GET", |c| query(redis::cmd("GET").arg(key), c))
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.with_conn("EXISTS", |c| query(redis::cmd("EXISTS").arg(key), c))
    }

    fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<bool> {
        self.with_conn("EXPIRE", |c| {
            query(redis::cmd("EXPIRE").arg(key).arg(ttl_secs), c)
        })
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let removed: usize = self.with_conn("DEL", |c| query(redis::cmd("DEL").arg(key), c))?;
        Ok(removed > 0)
    }

    fn index_upsert(&self, index: &str, member: &str, score: i64) -> StoreResult<()> {
        self.with_conn("ZADD", |c| {
            query(redis::cmd("ZADD").arg(index).arg(score).arg(member), c)
        })
    }

    fn index_remove(&self, index: &str, member: &str) -> StoreResult<bool> {
        let removed: usize = self.with_conn("ZREM", |c| {
            query(redis::cmd("ZREM").arg(index).arg(member), c)
        })?;
        Ok(removed > 0)
    }

    fn index_remove_by_score(&self, index: &str, min: i64, max: i64) -> StoreResult<Vec<String>> {
        let (min, max) = (score_bound(min), score_bound(max));
        let (members,): (Vec<String>,) = self.with_conn("ZREMRANGEBYSCORE", |c| {
            redis::pipe()
                .atomic()
                .cmd("ZRANGEBYSCORE")
                .arg(index)
                .arg(&min)
                .arg(&max)
                .cmd("ZREMRANGEBYSCORE")
                .arg(index)
                .arg(&min)
                .arg(&max)
                .ignore()
                .query(c)
        })?;
        Ok(members)
    }

    fn index_retain_newest(&self, index: &str, keep: usize) -> StoreResult<Vec<String>> {
        let Some(stop) = trim_stop(keep) else {
            return Ok(Vec::new());
        };
        let (members,): (Vec<String>,) = self.with_conn("ZREMRANGEBYRANK", |c| {
            redis::pipe()
                .atomic()
                .cmd("ZRANGE")
                .arg(index)
                .arg(0)
                .arg(stop)
                .cmd("ZREMRANGEBYRANK")
                .arg(index)
                .arg(0)
                .arg(stop)
                .ignore()
                .query(c)
        })?;
        Ok(members)
    }

    fn index_len(&self, index: &str) -> StoreResult<usize> {
        self.with_conn("ZCARD", |c| query(redis::cmd("ZCARD").arg(index), c))
    }

    fn index_score(&self, index: &str, member: &str) -> StoreResult<Option<i64>> {
        let score: Option<f64> = self.with_conn("ZSCORE", |c| {
            query(redis::cmd("ZSCORE").arg(index).arg(member), c)
        })?;
        Ok(score.map(|s| s as i64))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
