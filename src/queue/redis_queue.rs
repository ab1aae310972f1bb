//! Redis-backed Queue: the cross-process coordination point required by §4.2.
//!
//! Pop-minimum and the in-flight move are each expressed as a single Lua script
//! (`redis::Script`), matching the "atomic commands or short compare-and-set
//! sequences" requirement in §4.2's concurrency contract. Grounded on the `redis`
//! crate usage pattern in the video-generation worker reference example (manual
//! connection setup, explicit key namespacing, TTL-bearing checkpoint keys) —
//! that example used plain `XREAD`/hash commands without Lua; this adapter adds
//! scripting because the spec requires genuine cross-process atomicity that a
//! bare multi-command sequence cannot give.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::document::{Document, DocumentStore, ProcessingStage};

use super::{Queue, QueueConfig, QueueError, QueueStats, Result, backoff_secs};

const PENDING_KEY: &str = "queue:pending";
const IN_FLIGHT_KEY: &str = "queue:in_flight";
const FAILED_KEY: &str = "queue:failed";

fn worker_key(worker_id: &str) -> String {
    format!("workers:{worker_id}")
}
fn retry_count_key(id: &str) -> String {
    format!("retry_count:{id}")
}
fn last_error_key(id: &str) -> String {
    format!("last_error:{id}")
}

const DEQUEUE_SCRIPT: &str = r#"
local pending_key = KEYS[1]
local in_flight_key = KEYS[2]
local now = tonumber(ARGV[1])
local timeout_at = ARGV[2]
local worker_id = ARGV[3]
local batch_n = tonumber(ARGV[4])

local ids = redis.call('ZRANGEBYSCORE', pending_key, '-inf', now, 'LIMIT', 0, batch_n)
for i, id in ipairs(ids) do
  redis.call('ZREM', pending_key, id)
  redis.call('HSET', in_flight_key, id, worker_id .. '|' .. now .. '|' .. timeout_at)
end
return ids
"#;

const MARK_FAILED_SCRIPT: &str = r#"
local in_flight_key = KEYS[1]
local pending_key = KEYS[2]
local failed_key = KEYS[3]
local retry_count_key = KEYS[4]
local id = ARGV[1]
local retry = ARGV[2]
local max_attempts = tonumber(ARGV[3])
local now = tonumber(ARGV[4])
local backoff = tonumber(ARGV[5])

redis.call('HDEL', in_flight_key, id)
local count = redis.call('INCR', retry_count_key)

if retry == '1' and count <= max_attempts then
  redis.call('ZADD', pending_key, now + backoff, id)
  return 0
else
  redis.call('ZADD', failed_key, now, id)
  return 1
end
"#;

const RECOVER_ONE_SCRIPT: &str = r#"
local in_flight_key = KEYS[1]
local pending_key = KEYS[2]
local id = ARGV[1]
local expected = ARGV[2]
local now = tonumber(ARGV[3])

local current = redis.call('HGET', in_flight_key, id)
if current == expected then
  redis.call('HDEL', in_flight_key, id)
  redis.call('ZADD', pending_key, now, id)
  return 1
end
return 0
"#;

pub struct RedisQueue {
    conn: ConnectionManager,
    store: Arc<dyn DocumentStore>,
    config: QueueConfig,
}

impl RedisQueue {
    pub async fn connect(
        url: &str,
        store: Arc<dyn DocumentStore>,
        config: QueueConfig,
    ) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| QueueError::Backend(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(Self {
            conn,
            store,
            config,
        })
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn enqueue(&self, id: &str, priority: Option<DateTime<Utc>>) -> Result<()> {
        let score = priority.unwrap_or_else(Utc::now).timestamp();
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(PENDING_KEY, id, score)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        debug!(document_id = id, "enqueued");
        Ok(())
    }

    async fn dequeue(&self, worker_id: &str, batch_n: usize) -> Result<Vec<Document>> {
        let now = Utc::now();
        let timeout_at = now + chrono::Duration::seconds(self.config.processing_timeout_secs as i64);

        let mut conn = self.conn.clone();
        let ids: Vec<String> = redis::Script::new(DEQUEUE_SCRIPT)
            .key(PENDING_KEY)
            .key(IN_FLIGHT_KEY)
            .arg(now.timestamp())
            .arg(timeout_at.timestamp())
            .arg(worker_id)
            .arg(batch_n)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.load(&id).await? {
                Some(doc) if doc.deleted => {
                    debug!(document_id = id, "dequeued cancelled document, discarding");
                    let _: () = conn
                        .hdel(IN_FLIGHT_KEY, &id)
                        .await
                        .map_err(|e| QueueError::Backend(e.to_string()))?;
                }
                Some(mut doc) => {
                    doc.stage = ProcessingStage::Processing;
                    doc.updated_at = now;
                    self.store.save(&doc).await?;
                    documents.push(doc);
                }
                None => {
                    warn!(document_id = id, "dequeued orphan id, discarding");
                    let _: () = conn
                        .hdel(IN_FLIGHT_KEY, &id)
                        .await
                        .map_err(|e| QueueError::Backend(e.to_string()))?;
                }
            }
        }
        Ok(documents)
    }

    async fn mark_completed(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .hdel(IN_FLIGHT_KEY, id)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let _: () = conn
            .del((retry_count_key(id), last_error_key(id)))
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str, retry: bool) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(last_error_key(id), error, 24 * 3600)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let now = Utc::now().timestamp();
        let current_retry: Option<u32> = conn
            .get(retry_count_key(id))
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let backoff = backoff_secs(current_retry.unwrap_or(0));

        let dead_lettered: i64 = redis::Script::new(MARK_FAILED_SCRIPT)
            .key(IN_FLIGHT_KEY)
            .key(PENDING_KEY)
            .key(FAILED_KEY)
            .key(retry_count_key(id))
            .arg(id)
            .arg(if retry { "1" } else { "0" })
            .arg(self.config.retry_max_attempts)
            .arg(now)
            .arg(backoff)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        if let Some(mut doc) = self.store.load(id).await? {
            doc.stage = if dead_lettered == 1 { ProcessingStage::Failed } else { ProcessingStage::Pending };
            doc.updated_at = Utc::now();
            self.store.save(&doc).await?;
        }

        Ok(())
    }

    async fn recover_stale(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let entries: Vec<(String, String)> = conn
            .hgetall(IN_FLIGHT_KEY)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        let now = Utc::now();
        let mut recovered = 0usize;

        for (id, raw) in entries {
            let Some((worker_id, _started, timeout_at)) = parse_in_flight(&raw) else {
                continue;
            };
            if timeout_at >= now.timestamp() {
                continue;
            }
            let worker_alive: bool = conn
                .exists(worker_key(&worker_id))
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;
            if worker_alive {
                continue;
            }

            let moved: i64 = redis::Script::new(RECOVER_ONE_SCRIPT)
                .key(IN_FLIGHT_KEY)
                .key(PENDING_KEY)
                .arg(&id)
                .arg(&raw)
                .arg(now.timestamp())
                .invoke_async(&mut conn)
                .await
                .map_err(|e| QueueError::Backend(e.to_string()))?;

            if moved == 1 {
                let _: () = conn
                    .set_ex(
                        last_error_key(&id),
                        format!("worker {worker_id} timed out"),
                        24 * 3600,
                    )
                    .await
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                let _: () = conn
                    .incr(retry_count_key(&id), 1)
                    .await
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                if let Some(mut doc) = self.store.load(&id).await? {
                    doc.stage = ProcessingStage::Pending;
                    doc.updated_at = now;
                    self.store.save(&doc).await?;
                }
                recovered += 1;
            }
        }

        if recovered > 0 {
            debug!(count = recovered, "recovered stale jobs");
        }
        Ok(recovered)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let mut conn = self.conn.clone();
        let pending_len: usize = conn
            .zcard(PENDING_KEY)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let in_flight_len: usize = conn
            .hlen(IN_FLIGHT_KEY)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        let failed_len: usize = conn
            .zcard(FAILED_KEY)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        Ok(QueueStats {
            pending_len,
            in_flight_len,
            failed_len,
            live_workers: 0,
        })
    }

    async fn heartbeat(&self, worker_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(
                worker_key(worker_id),
                Utc::now().timestamp(),
                self.config.stale_worker_timeout_secs,
            )
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }
}

/// Parses the pipe-delimited `worker_id|started_at|timeout_at` value written by
/// [`DEQUEUE_SCRIPT`].
fn parse_in_flight(raw: &str) -> Option<(String, i64, i64)> {
    let mut parts = raw.splitn(3, '|');
    let worker_id = parts.next()?.to_string();
    let started_at = parts.next()?.parse().ok()?;
    let timeout_at = parts.next()?.parse().ok()?;
    Some((worker_id, started_at, timeout_at))
}
