//! Template rendering — `{{placeholder}}` substitution from the
//! notification's metadata.

use herald_common::types::Template;

/// A template rendered for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: Option<String>,
    pub body: String,
}

/// Render a template's subject and body against the event metadata.
pub fn render_template(template: &Template, data: &serde_json::Value) -> RenderedMessage {
    RenderedMessage {
        subject: template.subject.as_deref().map(|s| render_str(s, data)),
        body: render_str(&template.body, data),
    }
}

/// Substitute every `{{key}}` with the matching metadata value.
/// Unknown keys render as empty strings.
pub fn render_str(input: &str, data: &serde_json::Value) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some(value) = data.get(key) {
                    match value {
                        serde_json::Value::String(s) => out.push_str(s),
                        serde_json::Value::Null => {}
                        other => out.push_str(&other.to_string()),
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder: emit the remainder verbatim
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use herald_common::types::ChannelKind;
    use uuid::Uuid;

    fn make_template(subject: Option<&str>, body: &str) -> Template {
        Template {
            id: Uuid::new_v4(),
            template_key: "order_paid".to_string(),
            channel: ChannelKind::Email,
            locale: "en".to_string(),
            version: 1,
            subject: subject.map(|s| s.to_string()),
            body: body.to_string(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_renders_placeholders() {
        let data = serde_json::json!({"orderId": "12345", "amount": 42.5});
        let rendered = render_str("Order #{{orderId}} for {{amount}}", &data);
        assert_eq!(rendered, "Order #12345 for 42.5");
    }

    #[test]
    fn test_unknown_keys_render_empty() {
        let data = serde_json::json!({});
        assert_eq!(render_str("Hi {{name}}!", &data), "Hi !");
    }

    #[test]
    fn test_whitespace_inside_placeholder() {
        let data = serde_json::json!({"name": "Ana"});
        assert_eq!(render_str("Hi {{ name }}!", &data), "Hi Ana!");
    }

    #[test]
    fn test_unterminated_placeholder_kept_verbatim() {
        let data = serde_json::json!({"name": "Ana"});
        assert_eq!(render_str("Hi {{name", &data), "Hi {{name");
    }

    #[test]
    fn test_render_template_with_subject() {
        let template = make_template(Some("Order #{{orderId}}"), "Thanks, {{customerName}}!");
        let data = serde_json::json!({"orderId": "9", "customerName": "Ana"});
        let rendered = render_template(&template, &data);
        assert_eq!(rendered.subject.as_deref(), Some("Order #9"));
        assert_eq!(rendered.body, "Thanks, Ana!");
    }

    #[test]
    fn test_render_template_without_subject() {
        let template = make_template(None, "Order {{orderId}} confirmed");
        let rendered = render_template(&template, &serde_json::json!({"orderId": "7"}));
        assert!(rendered.subject.is_none());
        assert_eq!(rendered.body, "Order 7 confirmed");
    }
}
