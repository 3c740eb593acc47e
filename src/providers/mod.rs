//! Channel delivery providers.
//!
//! Each adapter decides at initialization whether it has the credentials it
//! needs. Without them it still starts, reports `ProviderStatus::Disabled`
//! and fails every send with `ProviderError::Disabled`.

pub mod email;
pub mod push;
pub mod sms;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Response;

use crate::{
    config::Config, error::ProviderError, formatter::FormattedNotification,
    models::notification::NotificationType,
};

pub use email::EmailProvider;
pub use push::PushProvider;
pub use sms::SmsProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Ready,
    Disabled,
}

#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    fn channel(&self) -> NotificationType;

    fn status(&self) -> ProviderStatus;

    async fn send(&self, notification: &FormattedNotification) -> Result<(), ProviderError>;
}

/// Builds one provider per channel from the configured credentials.
pub async fn initialize_all(config: &Config) -> Vec<Arc<dyn DeliveryProvider>> {
    let email: Arc<dyn DeliveryProvider> =
        Arc::new(EmailProvider::initialize(&config.email_settings()));
    let sms: Arc<dyn DeliveryProvider> = Arc::new(SmsProvider::initialize(&config.sms_settings()));
    let push: Arc<dyn DeliveryProvider> =
        Arc::new(PushProvider::initialize(&config.push_settings()).await);

    vec![email, sms, push]
}

/// Turns a non-2xx response into `ProviderError::Rejected`.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Rejected {
        status: status.as_u16(),
        body,
    })
}
