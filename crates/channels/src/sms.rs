//! SMS delivery via the Twilio Messages API.

use async_trait::async_trait;
use uuid::Uuid;

use herald_common::error::AppError;
use herald_common::pii::mask_phone;
use herald_common::types::{ChannelKind, Notification, Template};
use herald_engine::ports::{ChannelSender, SendOutcome};
use herald_engine::render::render_template;

pub struct TwilioSmsSender {
    client: reqwest::Client,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from: Option<String>,
    mock_mode: bool,
}

impl TwilioSmsSender {
    pub fn new(
        account_sid: Option<String>,
        auth_token: Option<String>,
        from: Option<String>,
        mock_mode: bool,
    ) -> Self {
        let configured = account_sid.is_some() && auth_token.is_some() && from.is_some();
        let mock_mode = mock_mode || !configured;
        if !configured && !mock_mode {
            tracing::warn!("Twilio credentials missing, sms sender runs in mock mode");
        }
        Self {
            client: reqwest::Client::new(),
            account_sid,
            auth_token,
            from,
            mock_mode,
        }
    }
}

#[async_trait]
impl ChannelSender for TwilioSmsSender {
    fn channel(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    fn provider(&self) -> &str {
        "twilio"
    }

    async fn send(
        &self,
        notification: &Notification,
        template: &Template,
    ) -> Result<SendOutcome, AppError> {
        let Some(to) = notification.recipient.phone.as_deref() else {
            return Ok(SendOutcome::failure(
                "No phone number provided",
                Some("SMS_MISSING_PHONE".to_string()),
            ));
        };

        let rendered = render_template(template, &notification.metadata);

        if self.mock_mode {
            tracing::info!(
                to = %mask_phone(to),
                correlation_id = ?notification.correlation_id,
                "MOCK: SMS would be sent"
            );
            return Ok(SendOutcome::delivered(format!(
                "mock-sms-{}",
                Uuid::new_v4().simple()
            )));
        }

        let account_sid = self.account_sid.as_deref().unwrap_or_default();
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{account_sid}/Messages.json"
        );
        let params = [
            ("To", to),
            ("From", self.from.as_deref().unwrap_or_default()),
            ("Body", rendered.body.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(account_sid, self.auth_token.as_deref())
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("twilio request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(
                notification_id = %notification.id,
                status = %status,
                "SMS send failed"
            );
            return Ok(SendOutcome::failure(
                format!("twilio returned {status}: {detail}"),
                Some(format!("SMS_HTTP_{}", status.as_u16())),
            ));
        }

        let reply: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("twilio response unreadable: {e}")))?;
        let message_sid = reply["sid"].as_str().map(|s| s.to_string());

        tracing::info!(
            notification_id = %notification.id,
            to = %mask_phone(to),
            message_sid = ?message_sid,
            "SMS sent successfully"
        );
        Ok(SendOutcome {
            success: true,
            provider_message_id: message_sid,
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

    fn make_notification(phone: Option<&str>) -> Notification {
        Notification::from_event(&InboundEvent {
            event_id: "e1".to_string(),
            event_type: "delivery.assigned".to_string(),
            occurred_at: Utc::now(),
            recipient: Recipient {
                phone: phone.map(|p| p.to_string()),
                role: Some("deliverer".to_string()),
                ..Default::default()
            },
            template_key: "delivery_assigned".to_string(),
            data: serde_json::json!({"deliveryId": "41"}),
            correlation_id: None,
            trace_id: None,
        })
    }

    fn make_template() -> Template {
        Template {
            id: Uuid::new_v4(),
            template_key: "delivery_assigned".to_string(),
            channel: ChannelKind::Sms,
            locale: "en".to_string(),
            version: 1,
            subject: None,
            body: "New delivery #{{deliveryId}} assigned".to_string(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mock_mode_delivers_synthetic_id() {
        let sender = TwilioSmsSender::new(None, None, None, true);
        let outcome = sender
            .send(&make_notification(Some("+5511999998888")), &make_template())
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.provider_message_id.unwrap().starts_with("mock-sms-"));
    }

    #[tokio::test]
    async fn test_missing_phone_is_delivery_failure() {
        let sender = TwilioSmsSender::new(None, None, None, true);
        let outcome = sender
            .send(&make_notification(None), &make_template())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error_code.as_deref(), Some("SMS_MISSING_PHONE"));
    }
}
