//! PostgreSQL attempt repository. Attempts are an append-only audit trail:
//! finalized rows are inserted once and never updated.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::types::Attempt;
use herald_engine::ports::AttemptStore;

pub struct PgAttemptStore {
    pool: PgPool,
}

impl PgAttemptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn save(&self, attempt: &Attempt) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO attempts (
                id, notification_id, channel, provider, status, error,
                error_code, provider_message_id, started_at, finished_at, duration_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.notification_id)
        .bind(attempt.channel.to_string())
        .bind(&attempt.provider)
        .bind(attempt.status.to_string())
        .bind(&attempt.error)
        .bind(&attempt.error_code)
        .bind(&attempt.provider_message_id)
        .bind(attempt.started_at)
        .bind(attempt.finished_at)
        .bind(attempt.duration_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_notification_id(
        &self,
        notification_id: Uuid,
    ) -> Result<Vec<Attempt>, AppError> {
        let attempts: Vec<Attempt> = sqlx::query_as(
            "SELECT * FROM attempts WHERE notification_id = $1 ORDER BY started_at ASC",
        )
        .bind(notification_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attempts)
    }

    async fn delete_by_notification_ids(
        &self,
        notification_ids: &[Uuid],
    ) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM attempts WHERE notification_id = ANY($1)")
            .bind(notification_ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
