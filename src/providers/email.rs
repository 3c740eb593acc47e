use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::{
    config::EmailSettings,
    error::ProviderError,
    formatter::FormattedNotification,
    models::{email::MailRequest, notification::NotificationType},
    providers::{DeliveryProvider, ProviderStatus, ensure_success},
};

const DEFAULT_SUBJECT: &str = "Notification";

struct EmailCredentials {
    api_key: String,
    from_address: String,
}

pub struct EmailProvider {
    http_client: Client,
    api_url: String,
    credentials: Option<EmailCredentials>,
}

impl EmailProvider {
    pub fn initialize(settings: &EmailSettings) -> Self {
        let credentials = match (&settings.api_key, &settings.from_address) {
            (Some(api_key), Some(from_address)) => {
                info!(api_url = %settings.api_url, from = %from_address, "Email provider initialized");
                Some(EmailCredentials {
                    api_key: api_key.clone(),
                    from_address: from_address.clone(),
                })
            }
            _ => {
                warn!("Email credentials not configured, email provider disabled");
                None
            }
        };

        Self {
            http_client: Client::new(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }
}

#[async_trait]
impl DeliveryProvider for EmailProvider {
    fn channel(&self) -> NotificationType {
        NotificationType::Email
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
                "Email provider disabled, notification not sent"
            );
            return Err(ProviderError::Disabled { channel: "email" });
        };

        debug!(
            notification_id = %notification.notification_id,
            to = %notification.channel,
            "Sending email"
        );

        let request = MailRequest::plain_text(
            &credentials.from_address,
            &notification.channel,
            notification.subject.as_deref().unwrap_or(DEFAULT_SUBJECT),
            &notification.body,
        );

        let response = self
            .http_client
            .post(format!("{}/v3/mail/send", self.api_url))
            .bearer_auth(&credentials.api_key)
            .json(&request)
            .send()
            .await?;

        ensure_success(response).await?;

        info!(notification_id = %notification.notification_id, "Email sent successfully");
        Ok(())
    }
}
