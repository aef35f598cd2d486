//! PostgreSQL preferences repository. One row per user; the channel
//! toggles, event overrides, and quiet-hours window live in JSONB columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use herald_common::error::AppError;
use herald_common::types::Preferences;
use herald_engine::ports::PreferencesStore;

pub struct PgPreferencesStore {
    pool: PgPool,
}

impl PgPreferencesStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PreferencesRow {
    user_id: String,
    channels: serde_json::Value,
    events: serde_json::Value,
    quiet_hours: Option<serde_json::Value>,
    locale: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PreferencesRow> for Preferences {
    type Error = AppError;

    fn try_from(row: PreferencesRow) -> Result<Self, AppError> {
        Ok(Preferences {
            user_id: Some(row.user_id),
            channels: serde_json::from_value(row.channels)?,
            events: serde_json::from_value(row.events)?,
            quiet_hours: row.quiet_hours.map(serde_json::from_value).transpose()?,
            locale: row.locale,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl PreferencesStore for PgPreferencesStore {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Preferences>, AppError> {
        let row: Option<PreferencesRow> =
            sqlx::query_as("SELECT * FROM preferences WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Preferences::try_from).transpose()
    }

    async fn save(&self, preferences: &Preferences) -> Result<(), AppError> {
        let Some(user_id) = &preferences.user_id else {
            return Err(AppError::Validation(
                "preferences require a user id".to_string(),
            ));
        };

        sqlx::query(
            r#"
            INSERT INTO preferences (user_id, channels, events, quiet_hours, locale, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE
            SET channels = EXCLUDED.channels,
                events = EXCLUDED.events,
                quiet_hours = EXCLUDED.quiet_hours,
                locale = EXCLUDED.locale,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(serde_json::to_value(&preferences.channels)?)
        .bind(serde_json::to_value(&preferences.events)?)
        .bind(
            preferences
                .quiet_hours
                .map(serde_json::to_value)
                .transpose()?,
        )
        .bind(&preferences.locale)
        .bind(preferences.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM preferences WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
