//! Redis-stream event bus publisher.
//!
//! Each subject maps to one stream; payloads travel as a single `payload`
//! field holding the JSON document. Consumption happens through consumer
//! groups (see the worker crate), giving load-balanced at-least-once
//! delivery across worker instances.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use herald_common::error::AppError;
use herald_engine::ports::EventPublisher;

pub struct RedisEventBus {
    redis: ConnectionManager,
}

impl RedisEventBus {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl EventPublisher for RedisEventBus {
    async fn publish(&self, subject: &str, payload: &serde_json::Value) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        let body = serde_json::to_string(payload)?;

        let id: String = redis
            .xadd(subject, "*", &[("payload", body.as_str())])
            .await?;

        tracing::debug!(subject, entry_id = %id, "Published to stream");
        Ok(())
    }
}
