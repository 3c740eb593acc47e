use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::ValidationError;

/// Weight given to a missing or unrecognized priority.
pub const DEFAULT_PRIORITY_WEIGHT: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Email,
    Sms,
    Push,
}

impl NotificationType {
    pub const ALL: [NotificationType; 3] = [
        NotificationType::Email,
        NotificationType::Sms,
        NotificationType::Push,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Email => "email",
            NotificationType::Sms => "sms",
            NotificationType::Push => "push",
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(NotificationType::Email),
            "sms" => Ok(NotificationType::Sms),
            "push" => Ok(NotificationType::Push),
            other => Err(ValidationError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// Numeric weight attached to the published message.
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 5,
            Priority::High => 7,
            Priority::Urgent => 10,
        }
    }

    /// Priority for a raw label as it arrives on the wire. Anything missing
    /// or unrecognized is treated as `medium`.
    pub fn from_label(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse::<Priority>().ok())
            .unwrap_or_default()
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(ValidationError::UnknownPriority(other.to_string())),
        }
    }
}

/// A validated notification request, before it has been given an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub user_id: String,

    #[serde(rename = "type")]
    pub notification_type: NotificationType,

    /// Email address, phone number or device token depending on the type.
    pub channel: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "HashMap::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub template_data: HashMap<String, JsonValue>,

    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,

    #[serde(
        default,
        skip_serializing_if = "HashMap::is_empty",
        deserialize_with = "null_as_empty"
    )]
    pub metadata: HashMap<String, JsonValue>,
}

/// Accepts `null` wherever a map is expected.
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<HashMap<String, JsonValue>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Queued messages carry whatever label the producer sent; only ingestion
/// rejects unknown priorities.
fn lenient_priority<'de, D>(deserializer: D) -> Result<Priority, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(Priority::from_label(raw.as_ref().and_then(JsonValue::as_str)))
}

impl NotificationRequest {
    pub fn new(
        user_id: impl Into<String>,
        notification_type: NotificationType,
        channel: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            notification_type,
            channel: channel.into(),
            subject: None,
            message: message.into(),
            template_id: None,
            template_data: HashMap::new(),
            priority: Priority::default(),
            scheduled_at: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_template_value(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.template_data.insert(key.into(), value);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_scheduled_at(mut self, scheduled_at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(scheduled_at);
        self
    }
}

/// Wire format of every queued notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEnvelope {
    pub notification_id: String,

    #[serde(flatten)]
    pub request: NotificationRequest,
}

impl NotificationEnvelope {
    pub fn new(notification_id: impl Into<String>, request: NotificationRequest) -> Self {
        Self {
            notification_id: notification_id.into(),
            request,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

/// Record published to the failed queue when a delivery is given up on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// Present when the payload could be decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope: Option<NotificationEnvelope>,

    /// Raw payload, kept only when decoding failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,

    pub source_queue: String,
    pub failure_reason: String,
    pub failed_at: String,
}
