use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::{
    config::SmsSettings,
    error::ProviderError,
    formatter::FormattedNotification,
    models::{
        notification::NotificationType,
        sms::{SmsRequest, SmsResponse},
    },
    providers::{DeliveryProvider, ProviderStatus, ensure_success},
};

struct SmsCredentials {
    account_sid: String,
    auth_token: String,
    from_number: String,
}

pub struct SmsProvider {
    http_client: Client,
    api_url: String,
    credentials: Option<SmsCredentials>,
}

impl SmsProvider {
    pub fn initialize(settings: &SmsSettings) -> Self {
        let credentials = match (
            &settings.account_sid,
            &settings.auth_token,
            &settings.from_number,
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => {
                info!(api_url = %settings.api_url, "SMS provider initialized");
                Some(SmsCredentials {
                    account_sid: account_sid.clone(),
                    auth_token: auth_token.clone(),
                    from_number: from_number.clone(),
                })
            }
            _ => {
                warn!("SMS credentials not configured, SMS provider disabled");
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
impl DeliveryProvider for SmsProvider {
    fn channel(&self) -> NotificationType {
        NotificationType::Sms
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
                "SMS provider disabled, notification not sent"
            );
            return Err(ProviderError::Disabled { channel: "sms" });
        };

        debug!(notification_id = %notification.notification_id, "Sending SMS");

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_url, credentials.account_sid
        );

        let request = SmsRequest {
            to: notification.channel.clone(),
            from: credentials.from_number.clone(),
            body: notification.body.clone(),
        };

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&credentials.account_sid, Some(&credentials.auth_token))
            .form(&request)
            .send()
            .await?;

        let response = ensure_success(response).await?;

        // The message is accepted at this point; an unreadable body must not trigger a resend.
        match response.json::<SmsResponse>().await {
            Ok(accepted) => info!(
                notification_id = %notification.notification_id,
                sid = %accepted.sid,
                status = ?accepted.status,
                "SMS sent successfully"
            ),
            Err(e) => warn!(
                notification_id = %notification.notification_id,
                error = %e,
                "SMS accepted but response body could not be parsed"
            ),
        }

        Ok(())
    }
}
