//! Event-stream consumer.
//!
//! Reads inbound business events from a Redis Stream through a shared
//! consumer group, so each event lands on exactly one worker instance while
//! crashed deliveries get redelivered. Every message is acked after
//! handling; the dispatcher owns dead-lettering, so a failed dispatch must
//! not wedge the stream.

use std::sync::Arc;
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};

use herald_common::types::InboundEvent;
use herald_engine::dispatch::Dispatcher;

/// How long one XREADGROUP call blocks waiting for new entries.
const BLOCK_MS: usize = 5_000;
/// Entries fetched per read.
const READ_COUNT: usize = 16;

pub struct EventConsumer {
    redis: ConnectionManager,
    stream: String,
    group: String,
    consumer_name: String,
    dispatcher: Arc<Dispatcher>,
}

impl EventConsumer {
    pub fn new(
        redis: ConnectionManager,
        stream: String,
        group: String,
        consumer_name: String,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            redis,
            stream,
            group,
            consumer_name,
            dispatcher,
        }
    }

    /// Start the consume loop. Runs until the task is cancelled.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut redis = self.redis.clone();
        self.ensure_group(&mut redis).await?;

        tracing::info!(
            stream = %self.stream,
            group = %self.group,
            consumer = %self.consumer_name,
            "Event consumer started"
        );

        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer_name)
            .count(READ_COUNT)
            .block(BLOCK_MS);

        loop {
            let reply: StreamReadReply = match redis
                .xread_options(&[&self.stream], &[">"], &options)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    tracing::error!(error = %e, "Stream read failed, backing off");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            for key in reply.keys {
                for entry in key.ids {
                    self.handle_entry(&mut redis, &entry).await;
                }
            }
        }
    }

    /// Create the consumer group if it does not exist yet.
    async fn ensure_group(&self, redis: &mut ConnectionManager) -> anyhow::Result<()> {
        let created: Result<String, redis::RedisError> = redis
            .xgroup_create_mkstream(&self.stream, &self.group, "$")
            .await;

        match created {
            Ok(_) => {
                tracing::info!(stream = %self.stream, group = %self.group, "Consumer group created");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_entry(
        &self,
        redis: &mut ConnectionManager,
        entry: &redis::streams::StreamId,
    ) {
        let payload: Option<String> = entry.get("payload");

        match payload.as_deref().map(serde_json::from_str::<InboundEvent>) {
            Some(Ok(event)) => {
                tracing::info!(
                    entry_id = %entry.id,
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    "Received event"
                );
                let outcome = self.dispatcher.dispatch(&event).await;
                if !outcome.is_success() {
                    tracing::warn!(
                        event_id = %event.event_id,
                        outcome = ?outcome,
                        "Event dispatch did not succeed"
                    );
                }
            }
            Some(Err(e)) => {
                tracing::error!(entry_id = %entry.id, error = %e, "Malformed event payload");
            }
            None => {
                tracing::error!(entry_id = %entry.id, "Stream entry without payload field");
            }
        }

        // Ack unconditionally: failures were dead-lettered or logged, and a
        // poison message must not be redelivered forever
        let acked: Result<i64, redis::RedisError> = redis
            .xack(&self.stream, &self.group, &[&entry.id])
            .await;
        if let Err(e) = acked {
            tracing::error!(entry_id = %entry.id, error = %e, "Failed to ack stream entry");
        }
    }
}
