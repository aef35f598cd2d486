//! Redis-backed inbox — the idempotency gate over inbound event ids.
//!
//! `mark_processed` uses `SET NX EX` for an atomic conditional insert with
//! automatic expiry: exactly one caller observes `true` per event id within
//! the dedup window. After the window expires a replayed event id is treated
//! as new; that trade-off is deliberate.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use herald_common::error::AppError;
use herald_engine::ports::InboxStore;

pub struct RedisInboxStore {
    redis: ConnectionManager,
    dedup_window_secs: u64,
}

impl RedisInboxStore {
    pub fn new(redis: ConnectionManager, dedup_window_secs: u64) -> Self {
        Self {
            redis,
            dedup_window_secs,
        }
    }

    fn key(event_id: &str) -> String {
        format!("inbox:event:{event_id}")
    }
}

#[async_trait]
impl InboxStore for RedisInboxStore {
    async fn is_processed(&self, event_id: &str) -> Result<bool, AppError> {
        let mut redis = self.redis.clone();
        let exists: bool = redis.exists(Self::key(event_id)).await?;
        Ok(exists)
    }

    async fn mark_processed(&self, event_id: &str) -> Result<bool, AppError> {
        let mut redis = self.redis.clone();

        // SET key "1" NX EX window
        // Returns Some("OK") if the key was set (first mark)
        // Returns None if the key already exists (already marked)
        let result: Option<String> = redis::cmd("SET")
            .arg(Self::key(event_id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.dedup_window_secs)
            .query_async(&mut redis)
            .await?;

        Ok(result.is_some())
    }

    async fn delete_by_user_id(&self, _user_id: &str) -> Result<u64, AppError> {
        // The inbox is keyed by event id and holds no user data; nothing to
        // erase. Entries age out with the dedup window.
        Ok(0)
    }
}
