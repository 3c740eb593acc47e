use serde::{Deserialize, Serialize};

use crate::models::notification::NotificationType;

/// Per-user channel opt-ins, read from the store at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub user_id: String,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub push_enabled: bool,
}

impl UserPreferences {
    pub fn all_enabled(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email_enabled: true,
            sms_enabled: true,
            push_enabled: true,
        }
    }

    pub fn allows(&self, notification_type: NotificationType) -> bool {
        match notification_type {
            NotificationType::Email => self.email_enabled,
            NotificationType::Sms => self.sms_enabled,
            NotificationType::Push => self.push_enabled,
        }
    }
}
