use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery channels, in fixed fallback priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Push,
    Email,
    Sms,
}

impl ChannelKind {
    /// Fallback priority: push first, then email, then sms.
    pub const PRIORITY: [ChannelKind; 3] =
        [ChannelKind::Push, ChannelKind::Email, ChannelKind::Sms];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Push => "push",
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
        }
    }

    pub fn parse(s: &str) -> Option<ChannelKind> {
        match s {
            "push" => Some(ChannelKind::Push),
            "email" => Some(ChannelKind::Email),
            "sms" => Some(ChannelKind::Sms),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notification lifecycle status.
///
/// QUEUED is the initial state. SENT is terminal. FAILED ends a cycle but is
/// re-enterable: the retry engine accepts FAILED notifications so delivery
/// can be re-triggered externally. RETRY re-enters itself on every
/// reschedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    Queued,
    Retry,
    Sent,
    Failed,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Queued => write!(f, "QUEUED"),
            NotificationStatus::Retry => write!(f, "RETRY"),
            NotificationStatus::Sent => write!(f, "SENT"),
            NotificationStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Delivery attempt status. PENDING until the provider call returns, then
/// finalized exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AttemptStatus {
    Pending,
    Success,
    Failed,
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptStatus::Pending => write!(f, "PENDING"),
            AttemptStatus::Success => write!(f, "SUCCESS"),
            AttemptStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Delivery target of an inbound event: contact capabilities plus role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Recipient {
    pub fn is_deliverer(&self) -> bool {
        self.role.as_deref() == Some("deliverer")
    }

    /// Whether the recipient can be reached at all on the given channel.
    pub fn has_capability(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Push => self.device_token.is_some(),
            ChannelKind::Email => self.email.is_some(),
            ChannelKind::Sms => self.phone.is_some(),
        }
    }
}

/// Inbound business event as consumed from the upstream bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub event_id: String,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub recipient: Recipient,
    pub template_key: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl InboundEvent {
    /// Schema-level validation, applied before any side effect.
    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.event_id.trim().is_empty() {
            return Err(crate::error::AppError::Validation(
                "eventId must not be empty".to_string(),
            ));
        }
        if self.event_type.trim().is_empty() {
            return Err(crate::error::AppError::Validation(
                "eventType must not be empty".to_string(),
            ));
        }
        if self.template_key.trim().is_empty() {
            return Err(crate::error::AppError::Validation(
                "templateKey must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Durable record of one event's delivery lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub event_id: String,
    pub event_type: String,
    pub recipient: Recipient,
    pub template_key: String,
    pub metadata: serde_json::Value,
    /// Channels attempted this lifecycle. Append-only, no duplicates.
    pub channels_tried: Vec<ChannelKind>,
    pub status: NotificationStatus,
    pub last_error: Option<String>,
    /// Equal to `event_id`; unique at the persistence boundary.
    pub idempotency_key: String,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub correlation_id: Option<String>,
    pub trace_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Create a fresh QUEUED notification for an inbound event.
    pub fn from_event(event: &InboundEvent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            recipient: event.recipient.clone(),
            template_key: event.template_key.clone(),
            metadata: event.data.clone(),
            channels_tried: Vec::new(),
            status: NotificationStatus::Queued,
            last_error: None,
            idempotency_key: event.event_id.clone(),
            next_attempt_at: None,
            correlation_id: event.correlation_id.clone(),
            trace_id: event.trace_id.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_channel_tried(&mut self, channel: ChannelKind) {
        if !self.channels_tried.contains(&channel) {
            self.channels_tried.push(channel);
        }
        self.touch();
    }

    pub fn update_status(&mut self, status: NotificationStatus) {
        self.status = status;
        self.touch();
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.last_error = error;
        self.touch();
    }

    pub fn schedule_next_attempt(&mut self, at: DateTime<Utc>) {
        self.next_attempt_at = Some(at);
        self.touch();
    }

    pub fn is_deliverer(&self) -> bool {
        self.recipient.is_deliverer()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// One try to deliver a notification via one channel. Created PENDING right
/// before the provider call and finalized right after; never mutated once it
/// leaves PENDING.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Attempt {
    pub id: Uuid,
    pub notification_id: Uuid,
    pub channel: ChannelKind,
    pub provider: String,
    pub status: AttemptStatus,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub provider_message_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl Attempt {
    pub fn new(notification_id: Uuid, channel: ChannelKind, provider: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            notification_id,
            channel,
            provider: provider.to_string(),
            status: AttemptStatus::Pending,
            error: None,
            error_code: None,
            provider_message_id: None,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
        }
    }

    pub fn mark_success(&mut self, provider_message_id: Option<String>) {
        if self.status != AttemptStatus::Pending {
            return;
        }
        self.status = AttemptStatus::Success;
        self.provider_message_id = provider_message_id;
        self.finish();
    }

    pub fn mark_failed(&mut self, error: Option<String>, error_code: Option<String>) {
        if self.status != AttemptStatus::Pending {
            return;
        }
        self.status = AttemptStatus::Failed;
        self.error = error;
        self.error_code = error_code;
        self.finish();
    }

    fn finish(&mut self) {
        let finished = Utc::now();
        self.duration_ms = Some((finished - self.started_at).num_milliseconds());
        self.finished_at = Some(finished);
    }
}

/// Per-channel global toggles. Defaults: push and email on, sms off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelToggles {
    pub push: bool,
    pub email: bool,
    pub sms: bool,
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self {
            push: true,
            email: true,
            sms: false,
        }
    }
}

impl ChannelToggles {
    pub fn is_enabled(&self, channel: ChannelKind) -> bool {
        match channel {
            ChannelKind::Push => self.push,
            ChannelKind::Email => self.email,
            ChannelKind::Sms => self.sms,
        }
    }
}

/// Quiet-hours window in hours of the day. Wraps around midnight when
/// `start > end` (e.g. 22–7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: u32,
    pub end: u32,
}

/// Per-user notification preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    pub user_id: Option<String>,
    #[serde(default)]
    pub channels: ChannelToggles,
    /// Per-event-type channel overrides. An entry for an event type fully
    /// replaces the global toggles for that type: channels absent from the
    /// entry count as disabled.
    #[serde(default)]
    pub events: HashMap<String, HashMap<String, bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
    pub locale: String,
    pub updated_at: DateTime<Utc>,
}

impl Preferences {
    pub fn defaults(locale: &str) -> Self {
        Self {
            user_id: None,
            channels: ChannelToggles::default(),
            events: HashMap::new(),
            quiet_hours: None,
            locale: locale.to_string(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_channel_enabled(&self, channel: ChannelKind) -> bool {
        self.channels.is_enabled(channel)
    }

    /// Event-level override wins when present; otherwise the global toggle.
    pub fn is_event_channel_enabled(&self, event_type: &str, channel: ChannelKind) -> bool {
        match self.events.get(event_type) {
            Some(overrides) => overrides.get(channel.as_str()).copied().unwrap_or(false),
            None => self.is_channel_enabled(channel),
        }
    }

    pub fn is_in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        let Some(window) = self.quiet_hours else {
            return false;
        };
        let hour = now.hour();
        if window.start < window.end {
            hour >= window.start && hour < window.end
        } else {
            hour >= window.start || hour < window.end
        }
    }
}

/// Message template for one channel and locale.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Template {
    pub id: Uuid,
    pub template_key: String,
    pub channel: ChannelKind,
    pub locale: String,
    pub version: i32,
    pub subject: Option<String>,
    pub body: String,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle transition published to the status stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub event_id: String,
    pub notification_id: Uuid,
    pub status: NotificationStatus,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}
