use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: String,
    pub checks: HashMap<String, ServiceHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time_ms: Some(response_time_ms),
            provider: None,
            error: None,
        }
    }

    pub fn unhealthy(error: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            response_time_ms: None,
            provider: None,
            error: Some(error),
        }
    }

    pub fn provider_ready() -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time_ms: None,
            provider: Some("ready".to_string()),
            error: None,
        }
    }

    /// An unconfigured channel degrades the service without making it unhealthy.
    pub fn provider_disabled() -> Self {
        Self {
            status: HealthStatus::Degraded,
            response_time_ms: None,
            provider: Some("disabled".to_string()),
            error: Some("Missing credentials, messages on this channel are rejected".to_string()),
        }
    }
}
