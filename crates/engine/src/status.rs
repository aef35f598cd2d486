//! Best-effort publication of lifecycle transitions and dead letters.
//!
//! Publish failures are logged and swallowed; they never fail the dispatch
//! or retry operation that triggered them.

use std::sync::Arc;

use chrono::Utc;

use herald_common::error::AppError;
use herald_common::types::{Attempt, InboundEvent, Notification, StatusUpdate};

use crate::ports::EventPublisher;

pub struct StatusPublisher {
    publisher: Arc<dyn EventPublisher>,
    status_subject: String,
    dlq_subject: String,
}

impl StatusPublisher {
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        status_subject: impl Into<String>,
        dlq_subject: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            status_subject: status_subject.into(),
            dlq_subject: dlq_subject.into(),
        }
    }

    /// Publish a status update for a terminal or successful transition.
    /// Best-effort: callers are permitted to ignore the result.
    pub async fn publish_status(
        &self,
        notification: &Notification,
        attempt: Option<&Attempt>,
    ) -> Result<(), AppError> {
        let update = StatusUpdate {
            event_id: notification.event_id.clone(),
            notification_id: notification.id,
            status: notification.status,
            event_type: notification.event_type.clone(),
            channel: attempt.map(|a| a.channel),
            provider: attempt.map(|a| a.provider.clone()),
            provider_message_id: attempt.and_then(|a| a.provider_message_id.clone()),
            error_code: attempt.and_then(|a| a.error_code.clone()),
            error: attempt
                .and_then(|a| a.error.clone())
                .or_else(|| notification.last_error.clone()),
            timestamp: Utc::now(),
            correlation_id: notification.correlation_id.clone(),
            trace_id: notification.trace_id.clone(),
        };

        let payload = serde_json::to_value(&update)?;
        let result = self.publisher.publish(&self.status_subject, &payload).await;

        match &result {
            Ok(()) => {
                tracing::info!(
                    notification_id = %notification.id,
                    status = %notification.status,
                    "Status update published"
                );
            }
            Err(e) => {
                tracing::error!(
                    notification_id = %notification.id,
                    error = %e,
                    "Failed to publish status update"
                );
            }
        }
        result
    }

    /// Forward an event that failed dispatch with an unrecoverable error to
    /// the dead-letter stream, annotated with the error and a timestamp.
    pub async fn publish_dead_letter(&self, event: &InboundEvent, error: &str) {
        let payload = match serde_json::to_value(event) {
            Ok(mut value) => {
                value["error"] = serde_json::Value::String(error.to_string());
                value["timestamp"] = serde_json::Value::String(Utc::now().to_rfc3339());
                value
            }
            Err(e) => {
                tracing::error!(event_id = %event.event_id, error = %e, "Failed to encode dead letter");
                return;
            }
        };

        if let Err(e) = self.publisher.publish(&self.dlq_subject, &payload).await {
            tracing::error!(
                event_id = %event.event_id,
                error = %e,
                "Failed to publish to DLQ"
            );
        }
    }
}
