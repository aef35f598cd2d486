//! Retry engine — re-drives a notification already in RETRY or FAILED state.
//!
//! Eligible channels are recomputed from the attempt history (capability ∩
//! role gate, minus channels at the per-channel cap) and tried in the same
//! order as the first dispatch. A round that delivers nothing either
//! exhausts the backoff budget (FAILED) or reschedules under the next
//! backoff delay (RETRY, no status publish).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use herald_common::backoff;
use herald_common::error::AppError;
use herald_common::types::{Attempt, ChannelKind, Notification, NotificationStatus};

use crate::metrics::Metrics;
use crate::ports::{AttemptStore, ChannelSender, NotificationStore, SendOutcome, TemplateStore};
use crate::selector::ChannelSelector;
use crate::status::StatusPublisher;

/// Result of a retry call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// A channel delivered; the notification is SENT.
    Sent { channel: ChannelKind },
    /// The notification was not in RETRY or FAILED state.
    NotRetryable,
    /// No channel remains eligible; the notification is FAILED.
    NoChannelsAvailable,
    /// The backoff budget is consumed; the notification is FAILED.
    MaxAttemptsReached,
    /// This round failed; another retry is scheduled.
    Rescheduled { next_attempt_at: DateTime<Utc> },
}

impl RetryOutcome {
    pub fn reason(&self) -> &'static str {
        match self {
            RetryOutcome::Sent { .. } => "sent",
            RetryOutcome::NotRetryable => "not_retryable",
            RetryOutcome::NoChannelsAvailable => "no_channels_available",
            RetryOutcome::MaxAttemptsReached => "max_attempts_reached",
            RetryOutcome::Rescheduled { .. } => "scheduled_for_retry",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Sent { .. })
    }
}

pub struct RetryEngine {
    notifications: Arc<dyn NotificationStore>,
    attempts: Arc<dyn AttemptStore>,
    templates: Arc<dyn TemplateStore>,
    senders: HashMap<ChannelKind, Arc<dyn ChannelSender>>,
    status: StatusPublisher,
    metrics: Arc<Metrics>,
    backoff_sequence: Vec<i64>,
    max_attempts_per_channel: usize,
    default_locale: String,
}

impl RetryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        attempts: Arc<dyn AttemptStore>,
        templates: Arc<dyn TemplateStore>,
        senders: HashMap<ChannelKind, Arc<dyn ChannelSender>>,
        status: StatusPublisher,
        metrics: Arc<Metrics>,
        backoff_sequence: Vec<i64>,
        max_attempts_per_channel: usize,
        default_locale: impl Into<String>,
    ) -> Self {
        Self {
            notifications,
            attempts,
            templates,
            senders,
            status,
            metrics,
            backoff_sequence,
            max_attempts_per_channel,
            default_locale: default_locale.into(),
        }
    }

    /// Re-evaluate one notification and retry its remaining channels.
    pub async fn retry(&self, notification_id: Uuid) -> Result<RetryOutcome, AppError> {
        let mut notification = self
            .notifications
            .find_by_id(notification_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Notification {notification_id} not found"))
            })?;

        if !matches!(
            notification.status,
            NotificationStatus::Retry | NotificationStatus::Failed
        ) {
            tracing::warn!(
                notification_id = %notification_id,
                status = %notification.status,
                "Notification not in retryable state"
            );
            return Ok(RetryOutcome::NotRetryable);
        }

        let history = self.attempts.find_by_notification_id(notification_id).await?;
        let mut attempt_counts: HashMap<ChannelKind, usize> = HashMap::new();
        for attempt in &history {
            *attempt_counts.entry(attempt.channel).or_insert(0) += 1;
        }

        let channels = ChannelSelector::retry_candidates(
            &notification.recipient,
            &attempt_counts,
            self.max_attempts_per_channel,
        );

        if channels.is_empty() {
            tracing::info!(
                notification_id = %notification_id,
                channels_tried = ?notification.channels_tried,
                "No channels available for retry"
            );
            notification.update_status(NotificationStatus::Failed);
            self.notifications.update(&notification).await?;
            self.status.publish_status(&notification, None).await.ok();
            return Ok(RetryOutcome::NoChannelsAvailable);
        }

        for &channel in &channels {
            if let Some(attempt) = self.retry_channel(&notification, channel).await {
                notification.update_status(NotificationStatus::Sent);
                self.notifications.update(&notification).await?;
                self.status.publish_status(&notification, Some(&attempt)).await.ok();
                tracing::info!(
                    notification_id = %notification_id,
                    channel = %channel,
                    "Notification retry succeeded"
                );
                return Ok(RetryOutcome::Sent { channel });
            }
        }

        // Every eligible channel was consumed this round
        let total_attempts = history.len() + channels.len();

        match backoff::next_attempt_time(total_attempts, &self.backoff_sequence, Utc::now()) {
            Some(next_attempt_at) => {
                notification.update_status(NotificationStatus::Retry);
                notification.schedule_next_attempt(next_attempt_at);
                self.notifications.update(&notification).await?;
                tracing::info!(
                    notification_id = %notification_id,
                    next_attempt_at = %next_attempt_at,
                    attempt_count = total_attempts,
                    "Notification retry scheduled"
                );
                Ok(RetryOutcome::Rescheduled { next_attempt_at })
            }
            None => {
                notification.update_status(NotificationStatus::Failed);
                notification.set_error(Some("Max retry attempts reached".to_string()));
                self.notifications.update(&notification).await?;
                self.status.publish_status(&notification, None).await.ok();
                tracing::warn!(
                    notification_id = %notification_id,
                    total_attempts,
                    max_attempts = self.backoff_sequence.len(),
                    "Notification retry exhausted"
                );
                Ok(RetryOutcome::MaxAttemptsReached)
            }
        }
    }

    /// Try one channel; failures of any kind are absorbed into the attempt
    /// record so one channel can never abort the round.
    async fn retry_channel(
        &self,
        notification: &Notification,
        channel: ChannelKind,
    ) -> Option<Attempt> {
        let Some(sender) = self.senders.get(&channel) else {
            tracing::warn!(channel = %channel, "No sender configured for channel");
            return None;
        };

        let template = match self
            .templates
            .find_by_key(&notification.template_key, channel, &self.default_locale)
            .await
        {
            Ok(Some(template)) => template,
            Ok(None) => {
                tracing::warn!(
                    template_key = %notification.template_key,
                    channel = %channel,
                    "Template not found for retry"
                );
                return None;
            }
            Err(e) => {
                tracing::error!(
                    notification_id = %notification.id,
                    channel = %channel,
                    error = %e,
                    "Template lookup failed during retry"
                );
                return None;
            }
        };

        let mut attempt = Attempt::new(notification.id, channel, sender.provider());
        self.metrics.record_dispatched(channel);

        self.metrics.inflight_add(channel, 1);
        let result = sender.send(notification, &template).await;
        self.metrics.inflight_add(channel, -1);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    notification_id = %notification.id,
                    channel = %channel,
                    error = %e,
                    "Error retrying channel"
                );
                SendOutcome::failure(e.to_string(), None)
            }
        };

        if outcome.success {
            attempt.mark_success(outcome.provider_message_id);
            self.metrics.record_sent(channel);
            if let Err(e) = self.attempts.save(&attempt).await {
                tracing::error!(
                    notification_id = %notification.id,
                    error = %e,
                    "Failed to persist successful attempt"
                );
            }
            Some(attempt)
        } else {
            attempt.mark_failed(outcome.error, outcome.error_code);
            self.metrics.record_failed(channel);
            if let Err(e) = self.attempts.save(&attempt).await {
                tracing::error!(
                    notification_id = %notification.id,
                    error = %e,
                    "Failed to persist failed attempt"
                );
            }
            None
        }
    }
}
