use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::{
    clients::{MessageBroker, NotificationStore},
    models::health::{HealthCheckResponse, HealthStatus, ServiceHealth},
    providers::{DeliveryProvider, ProviderStatus},
};

const CRITICAL_CHECKS: [&str; 2] = ["database", "message_broker"];

pub struct HealthChecker {
    store: Arc<dyn NotificationStore>,
    broker: Arc<dyn MessageBroker>,
    providers: Vec<Arc<dyn DeliveryProvider>>,
}

impl HealthChecker {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        broker: Arc<dyn MessageBroker>,
        providers: Vec<Arc<dyn DeliveryProvider>>,
    ) -> Self {
        Self {
            store,
            broker,
            providers,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database().await);
        checks.insert("message_broker".to_string(), self.check_broker());

        for provider in &self.providers {
            let health = match provider.status() {
                ProviderStatus::Ready => ServiceHealth::provider_ready(),
                ProviderStatus::Disabled => ServiceHealth::provider_disabled(),
            };
            checks.insert(format!("{}_provider", provider.channel()), health);
        }

        let overall_status = determine_overall_status(&checks);

        HealthCheckResponse {
            status: overall_status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            checks,
        }
    }

    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.store.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
            }
        }
    }

    fn check_broker(&self) -> ServiceHealth {
        if self.broker.is_connected() {
            ServiceHealth::healthy(0)
        } else {
            warn!("Message broker connection is down");
            ServiceHealth::unhealthy("Connection closed".to_string())
        }
    }
}

fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    let critical_unhealthy = checks
        .iter()
        .filter(|(name, _)| CRITICAL_CHECKS.contains(&name.as_str()))
        .any(|(_, health)| health.status == HealthStatus::Unhealthy);

    let has_degraded = checks
        .values()
        .any(|health| health.status != HealthStatus::Healthy);

    if critical_unhealthy {
        HealthStatus::Unhealthy
    } else if has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
