use serde::Deserialize;

use crate::backoff::{self, DEFAULT_BACKOFF_SEQUENCE};

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (inbox dedup + event streams)
    pub redis_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Stream carrying inbound business events
    pub event_stream: String,

    /// Stream receiving lifecycle status updates
    pub status_stream: String,

    /// Stream receiving dead-lettered events
    pub dlq_stream: String,

    /// Consumer group shared by all worker instances
    pub consumer_group: String,

    /// This worker's consumer name within the group
    pub consumer_name: String,

    /// Parsed backoff delays in milliseconds; its length is the retry budget
    pub backoff_sequence: Vec<i64>,

    /// Cap on delivery attempts per channel across the whole lifecycle
    pub max_attempts_per_channel: usize,

    /// Inbox dedup retention window in seconds (default: 600)
    pub dedup_window_secs: u64,

    /// Retry poller sweep interval in milliseconds (default: 30000)
    pub retry_poll_interval_ms: u64,

    /// Maximum notifications fetched per retry sweep (default: 100)
    pub retry_batch_size: i64,

    /// Whether per-user preference lookups are enabled; when off, defaults apply
    pub preferences_enabled: bool,

    /// Locale used for template lookups when preferences carry none
    pub default_locale: String,

    /// Short-circuit provider calls with synthetic results
    pub mock_providers: bool,

    /// FCM legacy server key for push delivery
    pub fcm_server_key: Option<String>,

    /// SendGrid API key for email delivery
    pub sendgrid_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Twilio account SID
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token
    pub twilio_auth_token: Option<String>,

    /// Twilio sender number
    pub twilio_from: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backoff_raw = std::env::var("NOTIF_BACKOFF_SEQUENCE")
            .unwrap_or_else(|_| DEFAULT_BACKOFF_SEQUENCE.to_string());
        let backoff_sequence = backoff::parse_backoff_sequence(&backoff_raw)
            .map_err(|e| anyhow::anyhow!("NOTIF_BACKOFF_SEQUENCE is invalid: {e}"))?;

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            event_stream: std::env::var("EVENT_STREAM")
                .unwrap_or_else(|_| "notifications.events".to_string()),
            status_stream: std::env::var("STATUS_STREAM")
                .unwrap_or_else(|_| "notifications.status.updated".to_string()),
            dlq_stream: std::env::var("DLQ_STREAM")
                .unwrap_or_else(|_| "notifications.dlq".to_string()),
            consumer_group: std::env::var("CONSUMER_GROUP")
                .unwrap_or_else(|_| "notification-workers".to_string()),
            consumer_name: std::env::var("CONSUMER_NAME")
                .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4())),
            backoff_sequence,
            max_attempts_per_channel: std::env::var("NOTIF_MAX_ATTEMPTS_PER_CHANNEL")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| {
                    anyhow::anyhow!("NOTIF_MAX_ATTEMPTS_PER_CHANNEL must be a valid usize")
                })?,
            dedup_window_secs: std::env::var("NOTIF_DEDUP_WINDOW_SEC")
                .unwrap_or_else(|_| "600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("NOTIF_DEDUP_WINDOW_SEC must be a valid u64"))?,
            retry_poll_interval_ms: std::env::var("RETRY_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_POLL_INTERVAL_MS must be a valid u64"))?,
            retry_batch_size: std::env::var("RETRY_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RETRY_BATCH_SIZE must be a valid i64"))?,
            preferences_enabled: std::env::var("FEATURE_PREFERENCES")
                .map(|v| v == "true")
                .unwrap_or(false),
            default_locale: std::env::var("DEFAULT_LOCALE").unwrap_or_else(|_| "en".to_string()),
            mock_providers: std::env::var("MOCK_PROVIDERS")
                .map(|v| v == "true")
                .unwrap_or(false),
            fcm_server_key: std::env::var("FCM_SERVER_KEY").ok(),
            sendgrid_api_key: std::env::var("SENDGRID_API_KEY").ok(),
            email_from: std::env::var("EMAIL_FROM").ok(),
            twilio_account_sid: std::env::var("TWILIO_ACCOUNT_SID").ok(),
            twilio_auth_token: std::env::var("TWILIO_AUTH_TOKEN").ok(),
            twilio_from: std::env::var("TWILIO_FROM").ok(),
        })
    }
}
