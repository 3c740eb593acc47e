use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::{
    error::ValidationError,
    models::notification::{NotificationRequest, NotificationType, Priority, null_as_empty},
};

/// Request body accepted at the ingestion boundary. Enum fields stay raw
/// strings here so that unknown values surface as `ValidationError`s.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    #[serde(default)]
    pub user_id: String,

    #[serde(default, rename = "type")]
    pub notification_type: String,

    #[serde(default)]
    pub channel: String,

    pub subject: Option<String>,

    #[serde(default)]
    pub message: String,

    pub template_id: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub template_data: HashMap<String, JsonValue>,

    pub priority: Option<String>,

    pub scheduled_at: Option<DateTime<Utc>>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub metadata: HashMap<String, JsonValue>,
}

impl TryFrom<CreateNotificationRequest> for NotificationRequest {
    type Error = ValidationError;

    fn try_from(body: CreateNotificationRequest) -> Result<Self, Self::Error> {
        require("userId", &body.user_id)?;
        require("type", &body.notification_type)?;
        require("channel", &body.channel)?;
        require("message", &body.message)?;

        let notification_type = body.notification_type.parse::<NotificationType>()?;
        let priority = match body.priority.as_deref() {
            Some(raw) => raw.parse::<Priority>()?,
            None => Priority::default(),
        };

        validate_channel(notification_type, &body.channel)?;

        Ok(NotificationRequest {
            user_id: body.user_id,
            notification_type,
            channel: body.channel,
            subject: body.subject,
            message: body.message,
            template_id: body.template_id,
            template_data: body.template_data,
            priority,
            scheduled_at: body.scheduled_at,
            metadata: body.metadata,
        })
    }
}

/// Checks the required fields of an already-typed request.
pub fn validate_request(request: &NotificationRequest) -> Result<(), ValidationError> {
    require("userId", &request.user_id)?;
    require("channel", &request.channel)?;
    require("message", &request.message)?;
    Ok(())
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

pub fn validate_channel(
    notification_type: NotificationType,
    channel: &str,
) -> Result<(), ValidationError> {
    match notification_type {
        NotificationType::Email => validate_email_address(channel),
        NotificationType::Sms => validate_phone_number(channel),
        NotificationType::Push => validate_device_token(channel),
    }
}

fn invalid(channel: &'static str, reason: &str) -> ValidationError {
    ValidationError::InvalidChannel {
        channel,
        reason: reason.to_string(),
    }
}

pub fn validate_email_address(address: &str) -> Result<(), ValidationError> {
    let Some((local, domain)) = address.split_once('@') else {
        return Err(invalid("email", "missing '@'"));
    };

    if local.is_empty() || domain.is_empty() {
        return Err(invalid("email", "empty local part or domain"));
    }

    if domain.contains('@') || address.chars().any(char::is_whitespace) {
        return Err(invalid("email", "malformed address"));
    }

    Ok(())
}

pub fn validate_phone_number(number: &str) -> Result<(), ValidationError> {
    let digits = number.strip_prefix('+').unwrap_or(number);

    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("sms", "only digits and a leading '+' are allowed"));
    }

    if !(7..=15).contains(&digits.len()) {
        return Err(invalid("sms", "expected 7 to 15 digits"));
    }

    Ok(())
}

pub fn validate_device_token(token: &str) -> Result<(), ValidationError> {
    if token.len() < 20 {
        return Err(invalid("push", "device token too short (minimum 20 characters)"));
    }

    if token.len() > 200 {
        return Err(invalid("push", "device token too long (maximum 200 characters)"));
    }

    let valid_chars = token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

    if !valid_chars {
        return Err(invalid("push", "device token contains invalid characters"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(notification_type: &str, channel: &str) -> CreateNotificationRequest {
        CreateNotificationRequest {
            user_id: "user-1".to_string(),
            notification_type: notification_type.to_string(),
            channel: channel.to_string(),
            message: "hello".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn converts_a_valid_body() {
        let mut input = body("email", "a@b.com");
        input.priority = Some("urgent".to_string());

        let request = NotificationRequest::try_from(input).unwrap();

        assert_eq!(request.notification_type, NotificationType::Email);
        assert_eq!(request.priority, Priority::Urgent);
    }

    #[test]
    fn omitted_priority_becomes_medium() {
        let request = NotificationRequest::try_from(body("sms", "+2348012345678")).unwrap();
        assert_eq!(request.priority, Priority::Medium);
    }

    #[test]
    fn rejects_missing_fields() {
        let mut input = body("email", "a@b.com");
        input.message = "   ".to_string();
        assert_eq!(
            NotificationRequest::try_from(input),
            Err(ValidationError::MissingField("message"))
        );

        let input = body("", "a@b.com");
        assert_eq!(
            NotificationRequest::try_from(input),
            Err(ValidationError::MissingField("type"))
        );
    }

    #[test]
    fn rejects_unknown_enum_values() {
        assert_eq!(
            NotificationRequest::try_from(body("pigeon", "a@b.com")),
            Err(ValidationError::UnknownType("pigeon".to_string()))
        );

        let mut input = body("email", "a@b.com");
        input.priority = Some("whenever".to_string());
        assert_eq!(
            NotificationRequest::try_from(input),
            Err(ValidationError::UnknownPriority("whenever".to_string()))
        );
    }

    #[test]
    fn channel_addresses_are_checked_per_type() {
        assert!(validate_channel(NotificationType::Email, "a@b.com").is_ok());
        assert!(validate_channel(NotificationType::Email, "ab.com").is_err());
        assert!(validate_channel(NotificationType::Email, "@b.com").is_err());

        assert!(validate_channel(NotificationType::Sms, "+14155550123").is_ok());
        assert!(validate_channel(NotificationType::Sms, "12345").is_err());
        assert!(validate_channel(NotificationType::Sms, "+1 415 555").is_err());

        assert!(validate_channel(NotificationType::Push, "fcm-token:APA91bHun4MxP5egoKMwt2KZ").is_ok());
        assert!(validate_channel(NotificationType::Push, "short").is_err());
        assert!(validate_channel(NotificationType::Push, &"x".repeat(201)).is_err());
        assert!(validate_channel(NotificationType::Push, "token with spaces in it!!").is_err());
    }

    #[test]
    fn null_maps_are_accepted_but_unknown_priority_is_not() {
        let input: CreateNotificationRequest = serde_json::from_value(serde_json::json!({
            "userId": "user-1",
            "type": "email",
            "channel": "a@b.com",
            "message": "hello",
            "templateData": null,
            "metadata": null,
            "priority": "critical"
        }))
        .unwrap();
        assert!(input.template_data.is_empty());
        assert!(input.metadata.is_empty());

        assert_eq!(
            NotificationRequest::try_from(input),
            Err(ValidationError::UnknownPriority("critical".to_string()))
        );
    }
}
