use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::{
    clients::{MessageBroker, NotificationStore},
    error::DispatchError,
    models::{
        notification::{NotificationEnvelope, NotificationRequest},
        validation::validate_request,
    },
    routing::route,
};

/// Where an accepted notification ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub notification_id: Uuid,
    pub queue: &'static str,
    pub priority_weight: u8,
}

/// Persists notification requests and queues them for their channel.
pub struct DispatchService {
    store: Arc<dyn NotificationStore>,
    broker: Arc<dyn MessageBroker>,
}

impl DispatchService {
    pub fn new(store: Arc<dyn NotificationStore>, broker: Arc<dyn MessageBroker>) -> Self {
        Self { store, broker }
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub async fn dispatch(&self, request: NotificationRequest) -> Result<Uuid, DispatchError> {
        self.submit(request)
            .await
            .map(|receipt| receipt.notification_id)
    }

    /// The record is always written before anything is published. A publish
    /// failure leaves the record in place and is returned to the caller.
    pub async fn submit(
        &self,
        request: NotificationRequest,
    ) -> Result<DispatchReceipt, DispatchError> {
        validate_request(&request)?;

        let notification_id = self.store.insert(&request).await.map_err(|e| {
            error!(user_id = %request.user_id, error = %e, "Failed to persist notification");
            DispatchError::Storage(e.to_string())
        })?;

        let queue = route(request.notification_type, request.priority);
        let priority_weight = request.priority.weight();
        let envelope = NotificationEnvelope::new(notification_id.to_string(), request);

        let publish_failed = |reason: String| {
            error!(
                notification_id = %notification_id,
                queue,
                error = %reason,
                "Notification persisted but could not be queued"
            );
            DispatchError::Publish {
                notification_id,
                reason,
            }
        };

        let payload = envelope.encode().map_err(|e| publish_failed(e.to_string()))?;

        self.broker
            .publish(queue, &payload, priority_weight)
            .await
            .map_err(|e| publish_failed(e.to_string()))?;

        info!(
            notification_id = %notification_id,
            user_id = %envelope.request.user_id,
            notification_type = %envelope.request.notification_type,
            priority = %envelope.request.priority,
            queue,
            "Notification queued"
        );

        Ok(DispatchReceipt {
            notification_id,
            queue,
            priority_weight,
        })
    }
}
