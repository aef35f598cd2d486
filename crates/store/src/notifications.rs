//! PostgreSQL notification repository.
//!
//! The idempotency-key uniqueness lives here: `save` is an
//! `ON CONFLICT DO NOTHING` insert on the unique `idempotency_key` column,
//! so a second insert for the same event id is ignored at the storage
//! boundary rather than by application logic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::{ChannelKind, Notification, NotificationStatus, Recipient};
use herald_engine::ports::{NotificationFilters, NotificationStore, Page};

pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    event_id: String,
    event_type: String,
    recipient: serde_json::Value,
    template_key: String,
    metadata: serde_json::Value,
    channels_tried: Vec<String>,
    status: NotificationStatus,
    last_error: Option<String>,
    idempotency_key: String,
    next_attempt_at: Option<DateTime<Utc>>,
    correlation_id: Option<String>,
    trace_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self, AppError> {
        let recipient: Recipient = serde_json::from_value(row.recipient)?;
        let channels_tried = row
            .channels_tried
            .iter()
            .filter_map(|s| ChannelKind::parse(s))
            .collect();

        Ok(Notification {
            id: row.id,
            event_id: row.event_id,
            event_type: row.event_type,
            recipient,
            template_key: row.template_key,
            metadata: row.metadata,
            channels_tried,
            status: row.status,
            last_error: row.last_error,
            idempotency_key: row.idempotency_key,
            next_attempt_at: row.next_attempt_at,
            correlation_id: row.correlation_id,
            trace_id: row.trace_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn channels_as_strings(notification: &Notification) -> Vec<String> {
    notification
        .channels_tried
        .iter()
        .map(|c| c.to_string())
        .collect()
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn save(&self, notification: &Notification) -> Result<(), AppError> {
        let recipient = serde_json::to_value(&notification.recipient)?;

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (
                id, event_id, event_type, recipient, template_key, metadata,
                channels_tried, status, last_error, idempotency_key,
                next_attempt_at, correlation_id, trace_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(notification.id)
        .bind(&notification.event_id)
        .bind(&notification.event_type)
        .bind(&recipient)
        .bind(&notification.template_key)
        .bind(&notification.metadata)
        .bind(channels_as_strings(notification))
        .bind(notification.status.to_string())
        .bind(&notification.last_error)
        .bind(&notification.idempotency_key)
        .bind(notification.next_attempt_at)
        .bind(&notification.correlation_id)
        .bind(&notification.trace_id)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                idempotency_key = %notification.idempotency_key,
                "Notification insert ignored (idempotency key conflict)"
            );
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>, AppError> {
        let row: Option<NotificationRow> =
            sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Notification::try_from).transpose()
    }

    async fn find_by_event_id(&self, event_id: &str) -> Result<Option<Notification>, AppError> {
        let row: Option<NotificationRow> =
            sqlx::query_as("SELECT * FROM notifications WHERE event_id = $1 LIMIT 1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Notification::try_from).transpose()
    }

    async fn find_pending_retries(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>, AppError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE status IN ('RETRY', 'QUEUED')
              AND (next_attempt_at IS NULL OR next_attempt_at <= $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn find_by_filters(
        &self,
        filters: &NotificationFilters,
    ) -> Result<Page<Notification>, AppError> {
        fn apply<'a>(
            builder: &mut QueryBuilder<'a, sqlx::Postgres>,
            filters: &'a NotificationFilters,
        ) {
            if let Some(status) = filters.status {
                builder.push(" AND status = ").push_bind(status.to_string());
            }
            if let Some(user_id) = &filters.user_id {
                builder
                    .push(" AND recipient->>'userId' = ")
                    .push_bind(user_id);
            }
            if let Some(event_type) = &filters.event_type {
                builder.push(" AND event_type = ").push_bind(event_type);
            }
            if let Some(from) = filters.from {
                builder.push(" AND created_at >= ").push_bind(from);
            }
            if let Some(to) = filters.to {
                builder.push(" AND created_at <= ").push_bind(to);
            }
        }

        let page = filters.page.max(1);
        let limit = filters.limit.max(1);

        let mut count_query =
            QueryBuilder::new("SELECT COUNT(*) FROM notifications WHERE TRUE");
        apply(&mut count_query, filters);
        let (total,): (i64,) = count_query.build_query_as().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::new("SELECT * FROM notifications WHERE TRUE");
        apply(&mut query, filters);
        query.push(" ORDER BY created_at DESC");
        query.push(" LIMIT ").push_bind(limit);
        query.push(" OFFSET ").push_bind((page - 1) * limit);

        let rows: Vec<NotificationRow> = query.build_query_as().fetch_all(&self.pool).await?;
        let data: Result<Vec<Notification>, AppError> =
            rows.into_iter().map(Notification::try_from).collect();

        Ok(Page {
            data: data?,
            page,
            limit,
            total,
            pages: (total + limit - 1) / limit,
        })
    }

    async fn update(&self, notification: &Notification) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET channels_tried = $2,
                status = $3,
                last_error = $4,
                next_attempt_at = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(notification.id)
        .bind(channels_as_strings(notification))
        .bind(notification.status.to_string())
        .bind(&notification.last_error)
        .bind(notification.next_attempt_at)
        .bind(notification.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM notifications WHERE recipient->>'userId' = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
