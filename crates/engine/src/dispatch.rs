//! Dispatch orchestrator — drives the first-attempt fallback cascade for a
//! fresh inbound event.
//!
//! Pipeline per event:
//! 1. Schema validation (no side effects on rejection)
//! 2. Inbox dedup check + atomic mark (idempotency gate)
//! 3. Preferences lookup (defaults when disabled or absent)
//! 4. Persist the QUEUED notification
//! 5. Fallback cascade over the ordered channel candidates, stopping at the
//!    first success
//!
//! Unexpected faults after the inbox mark are routed to the dead-letter
//! stream; the mark is not rolled back, so a replay of the same event id is
//! treated as already handled.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{
    Attempt, ChannelKind, InboundEvent, Notification, NotificationStatus, Preferences,
};

use crate::metrics::Metrics;
use crate::ports::{
    AttemptStore, ChannelSender, InboxStore, NotificationStore, PreferencesStore, SendOutcome,
    TemplateStore,
};
use crate::selector::ChannelSelector;
use crate::status::StatusPublisher;

/// Result of a dispatch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A notification was created and driven to SENT or FAILED.
    Dispatched { notification_id: Uuid },
    /// The event id was already processed; nothing was done.
    Duplicate,
    /// The event failed schema validation; no side effects occurred.
    Rejected { error: String },
    /// An unexpected fault occurred; the event went to the dead-letter stream.
    Failed { error: String },
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::Dispatched { .. } | DispatchOutcome::Duplicate
        )
    }
}

/// Central orchestrator for first-attempt delivery.
pub struct Dispatcher {
    notifications: Arc<dyn NotificationStore>,
    attempts: Arc<dyn AttemptStore>,
    templates: Arc<dyn TemplateStore>,
    preferences: Arc<dyn PreferencesStore>,
    inbox: Arc<dyn InboxStore>,
    senders: HashMap<ChannelKind, Arc<dyn ChannelSender>>,
    status: StatusPublisher,
    metrics: Arc<Metrics>,
    preferences_enabled: bool,
    default_locale: String,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        attempts: Arc<dyn AttemptStore>,
        templates: Arc<dyn TemplateStore>,
        preferences: Arc<dyn PreferencesStore>,
        inbox: Arc<dyn InboxStore>,
        senders: HashMap<ChannelKind, Arc<dyn ChannelSender>>,
        status: StatusPublisher,
        metrics: Arc<Metrics>,
        preferences_enabled: bool,
        default_locale: impl Into<String>,
    ) -> Self {
        Self {
            notifications,
            attempts,
            templates,
            preferences,
            inbox,
            senders,
            status,
            metrics,
            preferences_enabled,
            default_locale: default_locale.into(),
        }
    }

    /// Dispatch one inbound event.
    pub async fn dispatch(&self, event: &InboundEvent) -> DispatchOutcome {
        if let Err(e) = event.validate() {
            tracing::error!(event_id = %event.event_id, error = %e, "Invalid event schema");
            return DispatchOutcome::Rejected {
                error: e.to_string(),
            };
        }

        match self.process(event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    event_id = %event.event_id,
                    error = %e,
                    "Failed to dispatch notification"
                );
                self.status.publish_dead_letter(event, &e.to_string()).await;
                DispatchOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn process(&self, event: &InboundEvent) -> Result<DispatchOutcome, AppError> {
        if self.inbox.is_processed(&event.event_id).await? {
            tracing::info!(event_id = %event.event_id, "Event already processed (dedupe)");
            self.metrics.record_dedupe_hit();
            return Ok(DispatchOutcome::Duplicate);
        }

        // The conditional insert is authoritative: losing the race against a
        // concurrent worker counts as a duplicate.
        if !self.inbox.mark_processed(&event.event_id).await? {
            tracing::info!(event_id = %event.event_id, "Lost inbox mark race (dedupe)");
            self.metrics.record_dedupe_hit();
            return Ok(DispatchOutcome::Duplicate);
        }

        self.metrics.record_received();

        let preferences = self.load_preferences(event.recipient.user_id.as_deref()).await?;

        // Quiet hours are advisory only: detection never suppresses or
        // delays delivery.
        if preferences.is_in_quiet_hours(Utc::now()) {
            tracing::info!(
                event_id = %event.event_id,
                user_id = ?event.recipient.user_id,
                "User in quiet hours, delivering anyway"
            );
        }

        let mut notification = Notification::from_event(event);
        self.notifications.save(&notification).await?;

        let channels =
            ChannelSelector::candidates(&event.recipient, &event.event_type, &preferences);

        self.cascade(&mut notification, &channels, &preferences.locale)
            .await?;

        Ok(DispatchOutcome::Dispatched {
            notification_id: notification.id,
        })
    }

    async fn load_preferences(&self, user_id: Option<&str>) -> Result<Preferences, AppError> {
        let Some(user_id) = user_id else {
            return Ok(Preferences::defaults(&self.default_locale));
        };
        if !self.preferences_enabled {
            return Ok(Preferences::defaults(&self.default_locale));
        }
        Ok(self
            .preferences
            .find_by_user_id(user_id)
            .await?
            .unwrap_or_else(|| Preferences::defaults(&self.default_locale)))
    }

    /// Try each candidate channel in order, stopping at the first success.
    async fn cascade(
        &self,
        notification: &mut Notification,
        channels: &[ChannelKind],
        locale: &str,
    ) -> Result<(), AppError> {
        let mut last_error: Option<String> = None;

        for &channel in channels {
            let Some(sender) = self.senders.get(&channel) else {
                tracing::warn!(channel = %channel, "No sender configured for channel");
                continue;
            };

            let template = self
                .templates
                .find_by_key(&notification.template_key, channel, locale)
                .await?;
            let Some(template) = template else {
                tracing::warn!(
                    template_key = %notification.template_key,
                    channel = %channel,
                    locale,
                    "Template not found"
                );
                continue;
            };

            let mut attempt = Attempt::new(notification.id, channel, sender.provider());
            notification.mark_channel_tried(channel);
            self.metrics.record_dispatched(channel);

            self.metrics.inflight_add(channel, 1);
            let result = sender.send(notification, &template).await;
            self.metrics.inflight_add(channel, -1);

            // A raised infrastructure fault counts as a failed outcome for
            // cascade purposes.
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(
                        notification_id = %notification.id,
                        channel = %channel,
                        error = %e,
                        "Error dispatching to channel"
                    );
                    SendOutcome::failure(e.to_string(), None)
                }
            };

            if outcome.success {
                attempt.mark_success(outcome.provider_message_id);
                notification.update_status(NotificationStatus::Sent);
                self.attempts.save(&attempt).await?;
                self.notifications.update(notification).await?;
                self.metrics.record_sent(channel);

                self.status.publish_status(notification, Some(&attempt)).await.ok();

                tracing::info!(
                    notification_id = %notification.id,
                    channel = %channel,
                    provider = sender.provider(),
                    "Notification sent successfully"
                );
                return Ok(());
            }

            attempt.mark_failed(outcome.error.clone(), outcome.error_code);
            self.attempts.save(&attempt).await?;
            self.metrics.record_failed(channel);
            last_error = outcome.error;

            tracing::warn!(
                notification_id = %notification.id,
                channel = %channel,
                error = ?last_error,
                "Channel delivery failed, trying fallback"
            );
        }

        // Every candidate failed, or none was eligible
        notification.update_status(NotificationStatus::Failed);
        notification.set_error(last_error);
        self.notifications.update(notification).await?;
        self.status.publish_status(notification, None).await.ok();

        Ok(())
    }
}
