// src/redis_queue.rs
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Direction, Script};
use serde_json::{from_str, to_string};
use tracing::{debug, warn};

use crate::error::QueueError;
use crate::job::Job;
use crate::queue::Queue;
use crate::utils::constants::{DELAYED_JOBS_KEY, PREFIX_JOB, PREFIX_PROCESSING, PREFIX_QUEUE};

/// Redis broker.
///
/// Layout: a hash per job (`snm:job:<id>`: queue, status, payload,
/// created_at, run_at), a list of ready ids per queue (`snm:queue:<name>`),
/// a list of popped but unacknowledged ids per queue
/// (`snm:processing:<name>`) and one sorted set of delayed ids scored by due
/// time in milliseconds.
///
/// Recovery of the processing lists assumes one worker pool per broker.
#[derive(Clone)]
pub struct RedisQueue {
    conn: MultiplexedConnection,
}

fn queue_key(queue: &str) -> String {
    format!("{PREFIX_QUEUE}:{queue}")
}

fn job_key(job_id: &str) -> String {
    format!("{PREFIX_JOB}:{job_id}")
}

fn processing_key(queue: &str) -> String {
    format!("{PREFIX_PROCESSING}:{queue}")
}

// A retried job is resubmitted under its own id before the attempt is
// acknowledged, so the hash is only dropped while it still reads `processing`.
const ACK_SCRIPT: &str = r#"
redis.call('LREM', KEYS[1], 1, ARGV[1])
if redis.call('HGET', KEYS[2], 'status') == 'processing' then
    redis.call('DEL', KEYS[2])
end
return 1
"#;

const REQUEUE_SCRIPT: &str = r#"
local moved = 0
while redis.call('LMOVE', KEYS[1], KEYS[2], 'RIGHT', 'LEFT') do
    moved = moved + 1
end
return moved
"#;

// ARGV: now in millis, job key prefix, queue key prefix.
const PROMOTE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], 0, ARGV[1])
local moved = 0
for _, id in ipairs(due) do
    redis.call('ZREM', KEYS[1], id)
    local key = ARGV[2] .. ':' .. id
    local queue = redis.call('HGET', key, 'queue')
    if queue then
        redis.call('HSET', key, 'status', 'pending')
        redis.call('RPUSH', ARGV[3] .. ':' .. queue, id)
        moved = moved + 1
    end
end
return {moved, #due - moved}
"#;

impl RedisQueue {
    /// `rediss://` URLs go over TLS.
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            conn: client.get_multiplexed_async_connection().await?,
        })
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn enqueue(&self, queue: &str, job: Job) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let payload = to_string(&job)?;
        let now = Utc::now().to_rfc3339();

        conn.hset_multiple::<_, _, _, ()>(
            job_key(job.id()),
            &[
                ("queue", queue),
                ("status", "pending"),
                ("payload", payload.as_str()),
                ("created_at", now.as_str()),
            ],
        )
        .await?;
        conn.rpush::<_, _, ()>(queue_key(queue), job.id()).await?;

        debug!(queue, job_id = job.id(), "enqueued");
        Ok(())
    }

    async fn enqueue_in(&self, queue: &str, job: Job, delay: Duration) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let payload = to_string(&job)?;
        let now = Utc::now();
        let created_at = now.to_rfc3339();
        let run_at = now
            .timestamp_millis()
            .saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
        let run_at_str = run_at.to_string();

        conn.hset_multiple::<_, _, _, ()>(
            job_key(job.id()),
            &[
                ("queue", queue),
                ("status", "delayed"),
                ("payload", payload.as_str()),
                ("created_at", created_at.as_str()),
                ("run_at", run_at_str.as_str()),
            ],
        )
        .await?;
        conn.zadd::<_, _, _, ()>(DELAYED_JOBS_KEY, job.id(), run_at).await?;

        debug!(queue, job_id = job.id(), run_at, "delayed");
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<Job>, QueueError> {
        let mut conn = self.conn.clone();
        let job_id: Option<String> = conn
            .lmove(
                queue_key(queue),
                processing_key(queue),
                Direction::Left,
                Direction::Right,
            )
            .await?;
        let Some(job_id) = job_id else {
            return Ok(None);
        };

        let key = job_key(&job_id);
        let payload: Option<String> = conn.hget(&key, "payload").await?;
        let Some(payload) = payload else {
            conn.lrem::<_, _, ()>(processing_key(queue), 1, &job_id).await?;
            return Err(QueueError::MissingPayload(job_id));
        };
        conn.hset::<_, _, _, ()>(&key, "status", "processing").await?;
        Ok(Some(from_str(&payload)?))
    }

    async fn ack(&self, queue: &str, job: &Job) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(ACK_SCRIPT)
            .key(processing_key(queue))
            .key(job_key(job.id()))
            .arg(job.id())
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn requeue_unacked(&self, queue: &str) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let moved: usize = Script::new(REQUEUE_SCRIPT)
            .key(processing_key(queue))
            .key(queue_key(queue))
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    async fn promote_due(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        let now = Utc::now().timestamp_millis();
        let (moved, orphaned): (usize, usize) = Script::new(PROMOTE_SCRIPT)
            .key(DELAYED_JOBS_KEY)
            .arg(now)
            .arg(PREFIX_JOB)
            .arg(PREFIX_QUEUE)
            .invoke_async(&mut conn)
            .await?;
        if orphaned > 0 {
            warn!(orphaned, "delayed jobs without a stored queue dropped");
        }
        Ok(moved)
    }
}
