//! Herald worker binary: consumes business events from the upstream stream,
//! dispatches notifications, and sweeps for due retries.

mod consumer;
mod poller;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use herald_channels::{FcmPushSender, SendgridEmailSender, TwilioSmsSender};
use herald_common::config::AppConfig;
use herald_common::db::create_pool;
use herald_common::redis_pool::create_redis_pool;
use herald_common::types::ChannelKind;
use herald_engine::dispatch::Dispatcher;
use herald_engine::metrics::Metrics;
use herald_engine::ports::{
    AttemptStore, ChannelSender, EventPublisher, InboxStore, NotificationStore, PreferencesStore,
    TemplateStore,
};
use herald_engine::retry::RetryEngine;
use herald_engine::status::StatusPublisher;
use herald_store::bus::RedisEventBus;
use herald_store::inbox::RedisInboxStore;
use herald_store::attempts::PgAttemptStore;
use herald_store::notifications::PgNotificationStore;
use herald_store::preferences::PgPreferencesStore;
use herald_store::templates::PgTemplateStore;

use consumer::EventConsumer;
use poller::RetryPoller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "herald_worker=info,herald_engine=info,herald_store=info".into()
        }))
        .json()
        .init();

    tracing::info!("Herald worker starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Connect to Redis (inbox + event streams)
    let redis = create_redis_pool(&config.redis_url).await?;

    // Stores
    let notifications: Arc<dyn NotificationStore> =
        Arc::new(PgNotificationStore::new(pool.clone()));
    let attempts: Arc<dyn AttemptStore> = Arc::new(PgAttemptStore::new(pool.clone()));
    let templates: Arc<dyn TemplateStore> = Arc::new(PgTemplateStore::new(pool.clone()));
    let preferences: Arc<dyn PreferencesStore> = Arc::new(PgPreferencesStore::new(pool.clone()));
    let inbox: Arc<dyn InboxStore> = Arc::new(RedisInboxStore::new(
        redis.clone(),
        config.dedup_window_secs,
    ));
    let publisher: Arc<dyn EventPublisher> = Arc::new(RedisEventBus::new(redis.clone()));

    // Channel senders, in provider order push → email → sms
    let senders: HashMap<ChannelKind, Arc<dyn ChannelSender>> = HashMap::from([
        (
            ChannelKind::Push,
            Arc::new(FcmPushSender::new(
                config.fcm_server_key.clone(),
                config.mock_providers,
            )) as Arc<dyn ChannelSender>,
        ),
        (
            ChannelKind::Email,
            Arc::new(SendgridEmailSender::new(
                config.sendgrid_api_key.clone(),
                config.email_from.clone(),
                config.mock_providers,
            )) as Arc<dyn ChannelSender>,
        ),
        (
            ChannelKind::Sms,
            Arc::new(TwilioSmsSender::new(
                config.twilio_account_sid.clone(),
                config.twilio_auth_token.clone(),
                config.twilio_from.clone(),
                config.mock_providers,
            )) as Arc<dyn ChannelSender>,
        ),
    ]);

    let metrics = Arc::new(Metrics::new());

    let dispatcher = Arc::new(Dispatcher::new(
        notifications.clone(),
        attempts.clone(),
        templates.clone(),
        preferences.clone(),
        inbox.clone(),
        senders.clone(),
        StatusPublisher::new(
            publisher.clone(),
            config.status_stream.clone(),
            config.dlq_stream.clone(),
        ),
        metrics.clone(),
        config.preferences_enabled,
        config.default_locale.clone(),
    ));

    let retry_engine = Arc::new(RetryEngine::new(
        notifications.clone(),
        attempts.clone(),
        templates.clone(),
        senders,
        StatusPublisher::new(
            publisher.clone(),
            config.status_stream.clone(),
            config.dlq_stream.clone(),
        ),
        metrics.clone(),
        config.backoff_sequence.clone(),
        config.max_attempts_per_channel,
        config.default_locale.clone(),
    ));

    let event_consumer = EventConsumer::new(
        redis.clone(),
        config.event_stream.clone(),
        config.consumer_group.clone(),
        config.consumer_name.clone(),
        dispatcher,
    );

    let retry_poller = RetryPoller::new(
        notifications.clone(),
        retry_engine,
        Duration::from_millis(config.retry_poll_interval_ms),
        config.retry_batch_size,
    );

    // Run both loops with graceful shutdown on Ctrl+C
    tokio::select! {
        result = event_consumer.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Event consumer exited with error");
                return Err(e);
            }
        }
        result = retry_poller.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Retry poller exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Herald worker stopped.");
    Ok(())
}
