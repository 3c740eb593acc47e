use std::collections::HashMap;

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::models::notification::{NotificationEnvelope, NotificationType};

/// A notification ready to hand to a delivery provider.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedNotification {
    pub notification_id: String,
    pub user_id: String,
    pub notification_type: NotificationType,
    pub channel: String,
    pub subject: Option<String>,
    pub body: String,
    pub metadata: HashMap<String, JsonValue>,
}

/// Replaces every `{{key}}` in `text` with the matching value from
/// `template_data`. Placeholders without a value are left as they are.
/// The text is scanned once, left to right; substituted values are copied
/// verbatim and never scanned again.
pub fn format_message(text: &str, template_data: &HashMap<String, JsonValue>) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            rest = &rest[start..];
            break;
        };

        match template_data.get(&after_open[..end]) {
            Some(value) => {
                result.push_str(&value_to_string(value));
                rest = &after_open[end + 2..];
            }
            None => {
                // Keep one brace and rescan, so `{{{key}}}` still finds `{{key}}`.
                result.push('{');
                rest = &rest[start + 1..];
            }
        }
    }

    result.push_str(rest);
    result
}

fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn format_envelope(envelope: &NotificationEnvelope) -> FormattedNotification {
    let request = &envelope.request;

    debug!(
        notification_id = %envelope.notification_id,
        variable_count = request.template_data.len(),
        "Formatting notification"
    );

    let subject = match request.notification_type {
        NotificationType::Sms => None,
        NotificationType::Email | NotificationType::Push => request
            .subject
            .as_deref()
            .map(|s| format_message(s, &request.template_data)),
    };

    FormattedNotification {
        notification_id: envelope.notification_id.clone(),
        user_id: request.user_id.clone(),
        notification_type: request.notification_type,
        channel: request.channel.clone(),
        subject,
        body: format_message(&request.message, &request.template_data),
        metadata: request.metadata.clone(),
    }
}
