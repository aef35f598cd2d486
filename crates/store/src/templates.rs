//! PostgreSQL template repository. One row per (template_key, channel,
//! locale); `save` upserts in place.

use async_trait::async_trait;
use sqlx::PgPool;

use herald_common::error::AppError;
use herald_common::types::{ChannelKind, Template};
use herald_engine::ports::TemplateStore;

pub struct PgTemplateStore {
    pool: PgPool,
}

impl PgTemplateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    async fn find_by_key(
        &self,
        template_key: &str,
        channel: ChannelKind,
        locale: &str,
    ) -> Result<Option<Template>, AppError> {
        let template: Option<Template> = sqlx::query_as(
            r#"
            SELECT * FROM templates
            WHERE template_key = $1 AND channel = $2 AND locale = $3
            LIMIT 1
            "#,
        )
        .bind(template_key)
        .bind(channel.to_string())
        .bind(locale)
        .fetch_optional(&self.pool)
        .await?;

        Ok(template)
    }

    async fn save(&self, template: &Template) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO templates (
                id, template_key, channel, locale, version, subject, body, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (template_key, channel, locale) DO UPDATE
            SET version = EXCLUDED.version,
                subject = EXCLUDED.subject,
                body = EXCLUDED.body,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(template.id)
        .bind(&template.template_key)
        .bind(template.channel.to_string())
        .bind(&template.locale)
        .bind(template.version)
        .bind(&template.subject)
        .bind(&template.body)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
