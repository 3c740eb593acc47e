use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::retry::RetryConfig;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    pub queue_max_priority: Option<u8>,
    pub failed_queue_name: Option<String>,

    pub database_url: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,

    #[serde(default = "default_email_api_url")]
    pub email_api_url: String,
    pub email_api_key: Option<String>,
    pub email_from_address: Option<String>,

    #[serde(default = "default_sms_api_url")]
    pub sms_api_url: String,
    pub sms_account_sid: Option<String>,
    pub sms_auth_token: Option<String>,
    pub sms_from_number: Option<String>,

    #[serde(default = "default_fcm_api_url")]
    pub fcm_api_url: String,
    pub fcm_project_id: Option<String>,
    pub fcm_access_token: Option<String>,
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_server_port() -> u16 {
    8080
}

fn default_max_delivery_attempts() -> u32 {
    3
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

fn default_provider_timeout_ms() -> u64 {
    15_000
}

fn default_email_api_url() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_sms_api_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_fcm_api_url() -> String {
    "https://fcm.googleapis.com".to_string()
}

/// Email relay credentials. Both must be present for the adapter to start.
#[derive(Clone, Debug, Default)]
pub struct EmailSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from_address: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct SmsSettings {
    pub api_url: String,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PushSettings {
    pub api_url: String,
    pub project_id: Option<String>,
    /// Skips Google application-default credentials when set.
    pub access_token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;

        if config.max_delivery_attempts == 0 {
            return Err(anyhow!("MAX_DELIVERY_ATTEMPTS must be at least 1"));
        }

        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from_config(self)
    }

    pub fn email_settings(&self) -> EmailSettings {
        EmailSettings {
            api_url: self.email_api_url.clone(),
            api_key: non_empty(&self.email_api_key),
            from_address: non_empty(&self.email_from_address),
        }
    }

    pub fn sms_settings(&self) -> SmsSettings {
        SmsSettings {
            api_url: self.sms_api_url.clone(),
            account_sid: non_empty(&self.sms_account_sid),
            auth_token: non_empty(&self.sms_auth_token),
            from_number: non_empty(&self.sms_from_number),
        }
    }

    pub fn push_settings(&self) -> PushSettings {
        PushSettings {
            api_url: self.fcm_api_url.clone(),
            project_id: non_empty(&self.fcm_project_id),
            access_token: non_empty(&self.fcm_access_token),
        }
    }
}

/// Treats `FOO=` the same as an unset variable.
fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn config(overrides: serde_json::Value) -> Config {
        let mut value = json!({
            "rabbitmq_url": "amqp://localhost:5672/%2f",
            "database_url": "postgres://localhost/notifications",
        });
        if let (Some(base), Some(extra)) = (value.as_object_mut(), overrides.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(value).expect("valid config")
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(json!({}));

        assert_eq!(config.prefetch_count, 10);
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.queue_max_priority, None);
        assert_eq!(config.failed_queue_name, None);

        let retry = config.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay_ms, 500);
        assert_eq!(retry.max_delay_ms, 10_000);
        assert_eq!(retry.backoff_multiplier, 2);
    }

    #[test]
    fn blank_credentials_count_as_unset() {
        let config = config(json!({
            "email_api_key": "  ",
            "email_from_address": "noreply@example.org",
            "sms_account_sid": "AC1",
            "fcm_access_token": "",
        }));

        let email = config.email_settings();
        assert_eq!(email.api_key, None);
        assert_eq!(email.from_address.as_deref(), Some("noreply@example.org"));
        assert_eq!(config.sms_settings().account_sid.as_deref(), Some("AC1"));
        assert_eq!(config.push_settings().access_token, None);
        assert_eq!(config.push_settings().api_url, "https://fcm.googleapis.com");
    }
}
