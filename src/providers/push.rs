use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::{
    config::PushSettings,
    error::ProviderError,
    formatter::FormattedNotification,
    models::{
        fcm::{FcmMessage, FcmNotification, FcmRequest, FcmResponse},
        notification::NotificationType,
    },
    providers::{DeliveryProvider, ProviderStatus, ensure_success},
};

const FCM_SCOPES: &[&str] = &["https://www.googleapis.com/auth/firebase.messaging"];

enum PushAuth {
    Static(String),
    Google(Arc<dyn TokenProvider>),
}

struct PushCredentials {
    project_id: String,
    auth: PushAuth,
}

pub struct PushProvider {
    http_client: Client,
    api_url: String,
    credentials: Option<PushCredentials>,
}

impl PushProvider {
    pub async fn initialize(settings: &PushSettings) -> Self {
        let credentials = match &settings.project_id {
            None => {
                warn!("FCM project not configured, push provider disabled");
                None
            }
            Some(project_id) => match &settings.access_token {
                Some(token) => Some(PushCredentials {
                    project_id: project_id.clone(),
                    auth: PushAuth::Static(token.clone()),
                }),
                None => match gcp_auth::provider().await {
                    Ok(provider) => Some(PushCredentials {
                        project_id: project_id.clone(),
                        auth: PushAuth::Google(provider),
                    }),
                    Err(e) => {
                        warn!(error = %e, "No Google credentials found, push provider disabled");
                        None
                    }
                },
            },
        };

        if let Some(credentials) = &credentials {
            info!(project_id = %credentials.project_id, "FCM client initialized");
        }

        Self {
            http_client: Client::new(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    async fn access_token(auth: &PushAuth) -> Result<String, ProviderError> {
        match auth {
            PushAuth::Static(token) => Ok(token.clone()),
            PushAuth::Google(provider) => provider
                .token(FCM_SCOPES)
                .await
                .map(|token| token.as_str().to_string())
                .map_err(|e| ProviderError::Transport(format!("FCM token request failed: {}", e))),
        }
    }
}

/// FCM only carries string values in `data`.
fn data_payload(notification: &FormattedNotification) -> HashMap<String, String> {
    let mut data: HashMap<String, String> = notification
        .metadata
        .iter()
        .map(|(key, value)| {
            let value = match value {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect();

    data.insert(
        "notification_id".to_string(),
        notification.notification_id.clone(),
    );
    data
}

#[async_trait]
impl DeliveryProvider for PushProvider {
    fn channel(&self) -> NotificationType {
        NotificationType::Push
    }

    fn status(&self) -> ProviderStatus {
        if self.credentials.is_some() {
            ProviderStatus::Ready
        } else {
            ProviderStatus::Disabled
        }
    }

    async fn send(&self, notification: &FormattedNotification) -> Result<(), ProviderError> {
        let Some(credentials) = &self.credentials else {
            warn!(
                notification_id = %notification.notification_id,
                "Push provider disabled, notification not sent"
            );
            return Err(ProviderError::Disabled { channel: "push" });
        };

        debug!(
            notification_id = %notification.notification_id,
            "Sending FCM push notification"
        );

        let request = FcmRequest {
            message: FcmMessage {
                token: notification.channel.clone(),
                notification: FcmNotification {
                    title: notification.subject.clone(),
                    body: notification.body.clone(),
                },
                data: Some(data_payload(notification)),
            },
        };

        let token = Self::access_token(&credentials.auth).await?;

        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.api_url, credentials.project_id
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let response = ensure_success(response).await?;

        match response.json::<FcmResponse>().await {
            Ok(sent) => info!(
                notification_id = %notification.notification_id,
                message_name = %sent.name,
                "FCM push notification sent successfully"
            ),
            Err(e) => warn!(
                notification_id = %notification.notification_id,
                error = %e,
                "FCM accepted the message but the response could not be parsed"
            ),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn data_payload_stringifies_metadata() {
        let notification = FormattedNotification {
            notification_id: "n-1".to_string(),
            user_id: "u-1".to_string(),
            notification_type: NotificationType::Push,
            channel: "token".to_string(),
            subject: None,
            body: "body".to_string(),
            metadata: HashMap::from([
                ("screen".to_string(), json!("orders")),
                ("badge".to_string(), json!(2)),
            ]),
        };

        let data = data_payload(&notification);

        assert_eq!(data["screen"], "orders");
        assert_eq!(data["badge"], "2");
        assert_eq!(data["notification_id"], "n-1");
    }
}
