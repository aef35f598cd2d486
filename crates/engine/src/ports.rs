//! Port traits the engine orchestrates against.
//!
//! Every external collaborator (datastore, idempotency gate, provider
//! senders, downstream bus) is reached through one of these traits; the
//! engine never sees a concrete adapter type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{
    Attempt, ChannelKind, Notification, NotificationStatus, Preferences, Template,
};

/// Result of one provider send call.
///
/// Ordinary delivery failures are reported through `success == false`;
/// senders only return `Err` for infrastructure-level faults, which the
/// engine treats the same as a failed outcome for cascade purposes.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

impl SendOutcome {
    pub fn delivered(provider_message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            provider_message_id: Some(provider_message_id.into()),
            error: None,
            error_code: None,
        }
    }

    pub fn failure(error: impl Into<String>, error_code: Option<String>) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
            error_code,
        }
    }
}

/// Query filters for notification listings.
#[derive(Debug, Clone)]
pub struct NotificationFilters {
    pub status: Option<NotificationStatus>,
    pub user_id: Option<String>,
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: i64,
    pub limit: i64,
}

impl Default for NotificationFilters {
    fn default() -> Self {
        Self {
            status: None,
            user_id: None,
            event_type: None,
            from: None,
            to: None,
            page: 1,
            limit: 50,
        }
    }
}

/// One page of a filtered listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new notification. A second insert with the same
    /// idempotency key must be ignored at the storage boundary.
    async fn save(&self, notification: &Notification) -> Result<(), AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, AppError>;

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<Notification>, AppError>;

    /// Notifications due for a retry sweep: status RETRY or QUEUED with
    /// `next_attempt_at` unset or at/before `now`, capped at `limit`.
    async fn find_pending_retries(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError>;

    async fn find_by_filters(
        &self,
        filters: &NotificationFilters,
    ) -> Result<Page<Notification>, AppError>;

    async fn update(&self, notification: &Notification) -> Result<(), AppError>;

    async fn delete_by_user_id(&self, user_id: &str) -> Result<u64, AppError>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn save(&self, attempt: &Attempt) -> Result<(), AppError>;

    async fn find_by_notification_id(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<Attempt>, AppError>;

    async fn delete_by_notification_ids(&self, notification_ids: &[Uuid])
    -> Result<u64, AppError>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn find_by_key(
        &self,
        template_key: &str,
        channel: ChannelKind,
        locale: &str,
    ) -> Result<Option<Template>, AppError>;

    async fn save(&self, template: &Template) -> Result<(), AppError>;
}

#[async_trait]
pub trait PreferencesStore: Send + Sync {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Preferences>, AppError>;

    async fn save(&self, preferences: &Preferences) -> Result<(), AppError>;

    async fn delete_by_user_id(&self, user_id: &str) -> Result<u64, AppError>;
}

/// Idempotency gate over inbound event ids.
#[async_trait]
pub trait InboxStore: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> Result<bool, AppError>;

    /// Atomic conditional insert. Returns `true` only for the call that
    /// performed the first mark; `false` means another worker already holds
    /// the mark. This is the sole correctness mechanism against double
    /// dispatch — the `is_processed` pre-check is an optimization.
    async fn mark_processed(&self, event_id: &str) -> Result<bool, AppError>;

    async fn delete_by_user_id(&self, user_id: &str) -> Result<u64, AppError>;
}

/// One delivery provider bound to one channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> ChannelKind;

    fn provider(&self) -> &str;

    /// Deliver the rendered notification. Must not fail for ordinary
    /// delivery problems; those are reported in the outcome.
    async fn send(
        &self,
        notification: &Notification,
        template: &Template,
    ) -> Result<SendOutcome, AppError>;
}

/// Downstream topic publisher (status updates, dead letters).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, subject: &str, payload: &serde_json::Value) -> Result<(), AppError>;
}
