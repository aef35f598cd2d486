//! Email delivery via the SendGrid v3 API.

use async_trait::async_trait;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::pii::mask_email;
use herald_common::types::{ChannelKind, Notification, Template};
use herald_engine::ports::{ChannelSender, SendOutcome};
use herald_engine::render::render_template;

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

pub struct SendgridEmailSender {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
    mock_mode: bool,
}

impl SendgridEmailSender {
    pub fn new(api_key: Option<String>, from: Option<String>, mock_mode: bool) -> Self {
        let mock_mode = mock_mode || api_key.is_none();
        if api_key.is_none() && !mock_mode {
            tracing::warn!("SendGrid API key missing, email sender runs in mock mode");
        }
        Self {
            client: reqwest::Client::new(),
            api_key,
            from: from.unwrap_or_else(|| "notifications@herald.dev".to_string()),
            mock_mode,
        }
    }
}

#[async_trait]
impl ChannelSender for SendgridEmailSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn provider(&self) -> &str {
        "sendgrid"
    }

    async fn send(
        &self,
        notification: &Notification,
        template: &Template,
    ) -> Result<SendOutcome, AppError> {
        let Some(to) = notification.recipient.email.as_deref() else {
            return Ok(SendOutcome::failure(
                "No email address provided",
                Some("EMAIL_MISSING_ADDRESS".to_string()),
            ));
        };

        let rendered = render_template(template, &notification.metadata);
        let subject = rendered.subject.unwrap_or_else(|| "Notification".to_string());

        if self.mock_mode {
            tracing::info!(
                to = %mask_email(to),
                subject = %subject,
                correlation_id = ?notification.correlation_id,
                "MOCK: email would be sent"
            );
            return Ok(SendOutcome::delivered(format!(
                "mock-email-{}",
                Uuid::new_v4().simple()
            )));
        }

        let body = serde_json::json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": rendered.body }],
            "custom_args": {
                "notificationId": notification.id.to_string(),
                "eventId": notification.event_id,
            },
        });

        let response = self
            .client
            .post(SENDGRID_URL)
            .bearer_auth(self.api_key.as_deref().unwrap_or_default())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("sendgrid request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            tracing::info!(
                notification_id = %notification.id,
                to = %mask_email(to),
                message_id = ?message_id,
                "Email sent successfully"
            );
            return Ok(SendOutcome {
                success: true,
                provider_message_id: message_id,
                error: None,
                error_code: None,
            });
        }

        let detail = response.text().await.unwrap_or_default();
        tracing::error!(
            notification_id = %notification.id,
            status = %status,
            "Email send failed"
        );
        Ok(SendOutcome::failure(
            format!("sendgrid returned {status}: {detail}"),
            Some(format!("EMAIL_HTTP_{}", status.as_u16())),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use herald_common::types::{InboundEvent, Recipient};

    fn make_notification(email: Option<&str>) -> Notification {
        Notification::from_event(&InboundEvent {
            event_id: "e1".to_string(),
            event_type: "orders.paid".to_string(),
            occurred_at: Utc::now(),
            recipient: Recipient {
                email: email.map(|e| e.to_string()),
                ..Default::default()
            },
            template_key: "order_paid".to_string(),
            data: serde_json::json!({"orderId": "9"}),
            correlation_id: None,
            trace_id: None,
        })
    }

    fn make_template() -> Template {
        Template {
            id: Uuid::new_v4(),
            template_key: "order_paid".to_string(),
            channel: ChannelKind::Email,
            locale: "en".to_string(),
            version: 1,
            subject: Some("Order #{{orderId}}".to_string()),
            body: "Order {{orderId}} confirmed".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mock_mode_delivers_synthetic_id() {
        let sender = SendgridEmailSender::new(None, None, true);
        let outcome = sender
            .send(&make_notification(Some("a@b.com")), &make_template())
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.provider_message_id.unwrap().starts_with("mock-email-"));
    }

    #[tokio::test]
    async fn test_missing_address_is_delivery_failure() {
        let sender = SendgridEmailSender::new(None, None, true);
        let outcome = sender
            .send(&make_notification(None), &make_template())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_code.as_deref(), Some("EMAIL_MISSING_ADDRESS"));
    }
}
