//! Push delivery via FCM (legacy HTTP API).

use async_trait::async_trait;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::pii::mask_device_token;
use herald_common::types::{ChannelKind, Notification, Template};
use herald_engine::ports::{ChannelSender, SendOutcome};
use herald_engine::render::render_template;

const FCM_URL: &str = "https://fcm.googleapis.com/fcm/send";

pub struct FcmPushSender {
    client: reqwest::Client,
    server_key: Option<String>,
    mock_mode: bool,
}

impl FcmPushSender {
    pub fn new(server_key: Option<String>, mock_mode: bool) -> Self {
        let mock_mode = mock_mode || server_key.is_none();
        if server_key.is_none() && !mock_mode {
            tracing::warn!("FCM server key missing, push sender runs in mock mode");
        }
        Self {
            client: reqwest::Client::new(),
            server_key,
            mock_mode,
        }
    }
}

#[async_trait]
impl ChannelSender for FcmPushSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Push
    }

    fn provider(&self) -> &str {
        "fcm"
    }

    async fn send(
        &self,
        notification: &Notification,
        template: &Template,
    ) -> Result<SendOutcome, AppError> {
        let Some(token) = notification.recipient.device_token.as_deref() else {
            return Ok(SendOutcome::failure(
                "No device token provided",
                Some("PUSH_MISSING_TOKEN".to_string()),
            ));
        };

        let rendered = render_template(template, &notification.metadata);
        let title = rendered.subject.unwrap_or_else(|| "Notification".to_string());

        if self.mock_mode {
            tracing::info!(
                token = %mask_device_token(token),
                title = %title,
                correlation_id = ?notification.correlation_id,
                "MOCK: push notification would be sent"
            );
            return Ok(SendOutcome::delivered(format!(
                "mock-push-{}",
                Uuid::new_v4().simple()
            )));
        }

        let body = serde_json::json!({
            "to": token,
            "notification": { "title": title, "body": rendered.body },
            "data": {
                "notificationId": notification.id.to_string(),
                "eventId": notification.event_id,
                "eventType": notification.event_type,
            },
        });

        let response = self
            .client
            .post(FCM_URL)
            .header(
                "Authorization",
                format!("key={}", self.server_key.as_deref().unwrap_or_default()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("fcm request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                notification_id = %notification.id,
                status = %status,
                "Push send failed"
            );
            return Ok(SendOutcome::failure(
                format!("fcm returned {status}"),
                Some(format!("PUSH_HTTP_{}", status.as_u16())),
            ));
        }

        let reply: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("fcm response unreadable: {e}")))?;

        // Legacy API reports per-token results; a failure entry means the
        // token was rejected even though the HTTP call succeeded
        if reply.get("failure").and_then(|v| v.as_u64()).unwrap_or(0) > 0 {
            let reason = reply["results"][0]["error"]
                .as_str()
                .unwrap_or("unknown")
                .to_string();
            return Ok(SendOutcome::failure(
                format!("fcm rejected token: {reason}"),
                Some(reason),
            ));
        }

        let message_id = reply["results"][0]["message_id"]
            .as_str()
            .map(|s| s.to_string());

        tracing::info!(
            notification_id = %notification.id,
            message_id = ?message_id,
            "Push notification sent successfully"
        );
        Ok(SendOutcome {
            success: true,
            provider_message_id: message_id,
            error: None,
            error_code: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use herald_common::types::{InboundEvent, Recipient};

    fn make_notification(token: Option<&str>) -> Notification {
        Notification::from_event(&InboundEvent {
            event_id: "e1".to_string(),
            event_type: "orders.paid".to_string(),
            occurred_at: Utc::now(),
            recipient: Recipient {
                device_token: token.map(|t| t.to_string()),
                ..Default::default()
            },
            template_key: "order_paid".to_string(),
            data: serde_json::json!({}),
            correlation_id: None,
            trace_id: None,
        })
    }

    fn make_template() -> Template {
        Template {
            id: Uuid::new_v4(),
            template_key: "order_paid".to_string(),
            channel: ChannelKind::Push,
            locale: "en".to_string(),
            version: 1,
            subject: Some("Order update".to_string()),
            body: "Your order moved".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mock_mode_delivers_synthetic_id() {
        let sender = FcmPushSender::new(None, true);
        let outcome = sender
            .send(&make_notification(Some("tok-123456789")), &make_template())
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.provider_message_id.unwrap().starts_with("mock-push-"));
    }

    #[tokio::test]
    async fn test_missing_token_is_delivery_failure() {
        let sender = FcmPushSender::new(None, true);
        let outcome = sender
            .send(&make_notification(None), &make_template())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_code.as_deref(), Some("PUSH_MISSING_TOKEN"));
    }
}
