//! Retry poller.
//!
//! Periodic sweep for notifications due a retry, used because the upstream
//! bus has no native delayed-redelivery. Each tick pages RETRY/QUEUED
//! notifications whose `next_attempt_at` is unset or due and feeds them to
//! the retry engine one at a time; a failing notification is logged and
//! skipped so it can never block the rest of the sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use herald_engine::ports::NotificationStore;
use herald_engine::retry::RetryEngine;

pub struct RetryPoller {
    notifications: Arc<dyn NotificationStore>,
    engine: Arc<RetryEngine>,
    interval: Duration,
    batch_size: i64,
}

impl RetryPoller {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        engine: Arc<RetryEngine>,
        interval: Duration,
        batch_size: i64,
    ) -> Self {
        Self {
            notifications,
            engine,
            interval,
            batch_size,
        }
    }

    /// Start the sweep loop. The first sweep runs immediately.
    pub async fn run(&self) -> anyhow::Result<()> {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            batch_size = self.batch_size,
            "Retry poller started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// One sweep: fetch due notifications and retry each.
    pub async fn sweep(&self) {
        let due = match self
            .notifications
            .find_pending_retries(Utc::now(), self.batch_size)
            .await
        {
            Ok(due) => due,
            Err(e) => {
                tracing::error!(error = %e, "Retry sweep query failed");
                return;
            }
        };

        if due.is_empty() {
            tracing::debug!("No pending retries found");
            return;
        }

        tracing::info!(count = due.len(), "Processing pending retries");

        for notification in &due {
            match self.engine.retry(notification.id).await {
                Ok(outcome) => {
                    tracing::debug!(
                        notification_id = %notification.id,
                        reason = outcome.reason(),
                        "Retry processed"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        notification_id = %notification.id,
                        error = %e,
                        "Failed to retry notification"
                    );
                }
            }
        }

        tracing::info!(processed = due.len(), "Finished processing retries");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::DateTime;
    use uuid::Uuid;

    use herald_common::error::AppError;
    use herald_common::types::{
        Attempt, ChannelKind, InboundEvent, Notification, NotificationStatus, Recipient, Template,
    };
    use herald_engine::metrics::Metrics;
    use herald_engine::ports::{
        AttemptStore, ChannelSender, EventPublisher, NotificationFilters, Page, SendOutcome,
        TemplateStore,
    };
    use herald_engine::status::StatusPublisher;

    #[derive(Default)]
    struct MemNotificationStore {
        rows: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl NotificationStore for MemNotificationStore {
        async fn save(&self, notification: &Notification) -> Result<(), AppError> {
            self.rows.lock().unwrap().push(notification.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, AppError> {
            Ok(self.rows.lock().unwrap().iter().find(|n| n.id == id).cloned())
        }

        async fn find_by_event_id(
            &self,
            event_id: &str,
        ) -> Result<Option<Notification>, AppError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .find(|n| n.event_id == event_id)
                .cloned())
        }

        async fn find_pending_retries(
            &self,
            now: DateTime<chrono::Utc>,
            limit: i64,
        ) -> Result<Vec<Notification>, AppError> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|n| {
                    matches!(
                        n.status,
                        NotificationStatus::Retry | NotificationStatus::Queued
                    ) && n.next_attempt_at.map(|at| at <= now).unwrap_or(true)
                })
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn find_by_filters(
            &self,
            filters: &NotificationFilters,
        ) -> Result<Page<Notification>, AppError> {
            let data = self.rows.lock().unwrap().clone();
            let total = data.len() as i64;
            Ok(Page {
                data,
                page: filters.page,
                limit: filters.limit,
                total,
                pages: 1,
            })
        }

        async fn update(&self, notification: &Notification) -> Result<(), AppError> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(row) = rows.iter_mut().find(|n| n.id == notification.id) {
                *row = notification.clone();
            }
            Ok(())
        }

        async fn delete_by_user_id(&self, _user_id: &str) -> Result<u64, AppError> {
            Ok(0)
        }
    }

    /// Attempt store that fails lookups for one poisoned notification.
    #[derive(Default)]
    struct FlakyAttemptStore {
        fail_for: Mutex<Option<Uuid>>,
        rows: Mutex<Vec<Attempt>>,
    }

    #[async_trait]
    impl AttemptStore for FlakyAttemptStore {
        async fn save(&self, attempt: &Attempt) -> Result<(), AppError> {
            self.rows.lock().unwrap().push(attempt.clone());
            Ok(())
        }

        async fn find_by_notification_id(
            &self,
            notification_id: Uuid,
        ) -> Result<Vec<Attempt>, AppError> {
            if *self.fail_for.lock().unwrap() == Some(notification_id) {
                return Err(AppError::Internal("attempt store unavailable".to_string()));
            }
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|a| a.notification_id == notification_id)
                .cloned()
                .collect())
        }

        async fn delete_by_notification_ids(&self, _ids: &[Uuid]) -> Result<u64, AppError> {
            Ok(0)
        }
    }

    struct StaticTemplateStore(Template);

    #[async_trait]
    impl TemplateStore for StaticTemplateStore {
        async fn find_by_key(
            &self,
            _template_key: &str,
            _channel: ChannelKind,
            _locale: &str,
        ) -> Result<Option<Template>, AppError> {
            Ok(Some(self.0.clone()))
        }

        async fn save(&self, _template: &Template) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct NullPublisher;

    #[async_trait]
    impl EventPublisher for NullPublisher {
        async fn publish(
            &self,
            _subject: &str,
            _payload: &serde_json::Value,
        ) -> Result<(), AppError> {
            Ok(())
        }
    }

    struct DeliveringSender;

    #[async_trait]
    impl ChannelSender for DeliveringSender {
        fn channel(&self) -> ChannelKind {
            ChannelKind::Email
        }

        fn provider(&self) -> &str {
            "sendgrid"
        }

        async fn send(
            &self,
            _notification: &Notification,
            _template: &Template,
        ) -> Result<SendOutcome, AppError> {
            Ok(SendOutcome::delivered("msg-1"))
        }
    }

    fn make_retry_notification(event_id: &str) -> Notification {
        let mut notification = Notification::from_event(&InboundEvent {
            event_id: event_id.to_string(),
            event_type: "orders.paid".to_string(),
            occurred_at: chrono::Utc::now(),
            recipient: Recipient {
                user_id: Some("user-1".to_string()),
                email: Some("a@b.com".to_string()),
                ..Default::default()
            },
            template_key: "order_paid".to_string(),
            data: serde_json::json!({}),
            correlation_id: None,
            trace_id: None,
        });
        notification.update_status(NotificationStatus::Retry);
        notification
    }

    fn make_template() -> Template {
        Template {
            id: Uuid::new_v4(),
            template_key: "order_paid".to_string(),
            channel: ChannelKind::Email,
            locale: "en".to_string(),
            version: 1,
            subject: None,
            body: "hello".to_string(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn build_poller(
        notifications: Arc<MemNotificationStore>,
        attempts: Arc<FlakyAttemptStore>,
    ) -> RetryPoller {
        let senders: HashMap<ChannelKind, Arc<dyn ChannelSender>> =
            HashMap::from([(ChannelKind::Email, Arc::new(DeliveringSender) as _)]);
        let engine = Arc::new(RetryEngine::new(
            notifications.clone(),
            attempts,
            Arc::new(StaticTemplateStore(make_template())),
            senders,
            StatusPublisher::new(Arc::new(NullPublisher), "status", "dlq"),
            Arc::new(Metrics::new()),
            vec![1000; 8],
            3,
            "en",
        ));
        RetryPoller::new(notifications, engine, Duration::from_secs(30), 100)
    }

    #[tokio::test]
    async fn test_sweep_retries_due_notifications() {
        let notifications = Arc::new(MemNotificationStore::default());
        let attempts = Arc::new(FlakyAttemptStore::default());
        let due = make_retry_notification("e1");
        notifications.save(&due).await.unwrap();

        let poller = build_poller(notifications.clone(), attempts);
        poller.sweep().await;

        let stored = notifications.find_by_id(due.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn test_one_failing_notification_does_not_block_sweep() {
        let notifications = Arc::new(MemNotificationStore::default());
        let attempts = Arc::new(FlakyAttemptStore::default());

        let poisoned = make_retry_notification("e1");
        let healthy = make_retry_notification("e2");
        notifications.save(&poisoned).await.unwrap();
        notifications.save(&healthy).await.unwrap();
        *attempts.fail_for.lock().unwrap() = Some(poisoned.id);

        let poller = build_poller(notifications.clone(), attempts);
        poller.sweep().await;

        // The poisoned notification is untouched, the healthy one delivered
        let stored = notifications.find_by_id(poisoned.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Retry);
        let stored = notifications.find_by_id(healthy.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn test_sweep_skips_future_scheduled_notifications() {
        let notifications = Arc::new(MemNotificationStore::default());
        let attempts = Arc::new(FlakyAttemptStore::default());

        let mut future = make_retry_notification("e1");
        future.schedule_next_attempt(chrono::Utc::now() + chrono::Duration::hours(1));
        notifications.save(&future).await.unwrap();

        let poller = build_poller(notifications.clone(), attempts);
        poller.sweep().await;

        let stored = notifications.find_by_id(future.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Retry);
    }

    #[tokio::test]
    async fn test_queued_notifications_surface_but_are_not_retryable() {
        // The sweep picks up QUEUED notifications; the retry engine then
        // rejects them as not retryable, leaving them untouched
        let notifications = Arc::new(MemNotificationStore::default());
        let attempts = Arc::new(FlakyAttemptStore::default());

        let queued = Notification::from_event(&InboundEvent {
            event_id: "e1".to_string(),
            event_type: "orders.paid".to_string(),
            occurred_at: chrono::Utc::now(),
            recipient: Recipient {
                email: Some("a@b.com".to_string()),
                ..Default::default()
            },
            template_key: "order_paid".to_string(),
            data: serde_json::json!({}),
            correlation_id: None,
            trace_id: None,
        });
        notifications.save(&queued).await.unwrap();

        let poller = build_poller(notifications.clone(), attempts);
        poller.sweep().await;

        let stored = notifications.find_by_id(queued.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Queued);
    }
}
