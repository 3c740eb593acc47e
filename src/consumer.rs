//! Channel consumers.
//!
//! One consumer per channel reads that channel's base and urgent queues, hands
//! each notification to the channel's provider and settles the message:
//! acknowledged after a successful send, rejected without requeue otherwise.
//! Consumers share nothing but the broker handle, so a stuck or failing
//! channel never holds up the others.

use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use chrono::{SecondsFormat, Utc};
use futures_util::{
    StreamExt,
    stream::{PollNext, select_with_strategy},
};
use tokio::{sync::watch, task::JoinSet, time::timeout};
use tracing::{debug, error, info, warn};

use crate::{
    clients::{Delivery, MessageBroker},
    config::Config,
    error::ProviderError,
    formatter::{FormattedNotification, format_envelope},
    models::{
        notification::{DEFAULT_PRIORITY_WEIGHT, DeadLetter, NotificationEnvelope, NotificationType},
        retry::RetryConfig,
    },
    providers::{DeliveryProvider, ProviderStatus},
    routing::queues_for,
    utils::retry_with_backoff_if,
};

#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub retry: RetryConfig,
    pub provider_timeout: Duration,
    /// Terminal failures are copied here before being rejected.
    pub failed_queue: Option<String>,
}

impl DeliveryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.retry_config(),
            provider_timeout: Duration::from_millis(config.provider_timeout_ms),
            failed_queue: config.failed_queue_name.clone(),
        }
    }
}

/// Terminal state of a consumed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acknowledged,
    Rejected { reason: String },
}

impl DeliveryOutcome {
    fn rejected(reason: impl Into<String>) -> Self {
        DeliveryOutcome::Rejected {
            reason: reason.into(),
        }
    }
}

pub struct ChannelConsumer {
    channel: NotificationType,
    broker: Arc<dyn MessageBroker>,
    provider: Arc<dyn DeliveryProvider>,
    policy: DeliveryPolicy,
}

impl ChannelConsumer {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        provider: Arc<dyn DeliveryProvider>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            channel: provider.channel(),
            broker,
            provider,
            policy,
        }
    }

    pub fn channel(&self) -> NotificationType {
        self.channel
    }

    /// Consumes until `shutdown` flips to true or the broker closes the
    /// streams. Fails without consuming anything if the queues cannot be
    /// subscribed to.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        let (base_queue, urgent_queue) = queues_for(self.channel);
        let consumer_tag = format!("{}_worker", self.channel);

        let urgent_tag = format!("{}_urgent", consumer_tag);

        let urgent = self.broker.consume(urgent_queue, &urgent_tag).await?;
        let base = match self.broker.consume(base_queue, &consumer_tag).await {
            Ok(base) => base,
            Err(e) => {
                if let Err(cancel_error) = self.broker.cancel(&urgent_tag).await {
                    warn!(
                        consumer_tag = %urgent_tag,
                        error = %cancel_error,
                        "Failed to cancel urgent consumer"
                    );
                }
                return Err(e);
            }
        };

        // Poll the urgent queue first whenever both have messages waiting.
        let mut deliveries = select_with_strategy(urgent, base, |_: &mut ()| PollNext::Left);

        info!(
            channel = %self.channel,
            base_queue,
            urgent_queue,
            provider_status = ?self.provider.status(),
            "Channel consumer started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(channel = %self.channel, "Shutdown requested, stopping consumer");
                        break;
                    }
                }
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => {
                        self.process(delivery).await;
                    }
                    Some(Err(e)) => {
                        error!(channel = %self.channel, error = %e, "Delivery stream failed");
                        return Err(e);
                    }
                    None => {
                        warn!(channel = %self.channel, "Delivery stream closed by broker");
                        break;
                    }
                },
            }
        }

        info!(channel = %self.channel, "Channel consumer stopped");
        Ok(())
    }

    /// Handles one delivery from receipt to acknowledge or reject.
    pub async fn process(&self, delivery: Delivery) -> DeliveryOutcome {
        debug!(
            channel = %self.channel,
            queue = %delivery.queue,
            delivery_tag = delivery.delivery_tag,
            redelivered = delivery.redelivered,
            "Message received"
        );

        let outcome = self.handle(&delivery).await;

        match &outcome {
            DeliveryOutcome::Acknowledged => {
                if let Err(e) = self.broker.acknowledge(delivery.delivery_tag).await {
                    error!(
                        delivery_tag = delivery.delivery_tag,
                        error = %e,
                        "Failed to acknowledge message"
                    );
                }
            }
            DeliveryOutcome::Rejected { reason } => {
                self.dead_letter(&delivery, reason).await;

                if let Err(e) = self.broker.reject(delivery.delivery_tag, false).await {
                    error!(
                        delivery_tag = delivery.delivery_tag,
                        error = %e,
                        "Failed to reject message"
                    );
                }
            }
        }

        outcome
    }

    async fn handle(&self, delivery: &Delivery) -> DeliveryOutcome {
        let envelope = match NotificationEnvelope::decode(&delivery.data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    queue = %delivery.queue,
                    delivery_tag = delivery.delivery_tag,
                    error = %e,
                    "Dropping undecodable message"
                );
                return DeliveryOutcome::rejected(format!("Undecodable payload: {}", e));
            }
        };

        let notification_id = envelope.notification_id.as_str();

        if envelope.request.notification_type != self.channel {
            warn!(
                notification_id,
                expected = %self.channel,
                actual = %envelope.request.notification_type,
                "Message routed to the wrong channel"
            );
            return DeliveryOutcome::rejected(format!(
                "{} notification on the {} queue",
                envelope.request.notification_type, self.channel
            ));
        }

        if let Some(scheduled_at) = envelope.request.scheduled_at {
            if scheduled_at > Utc::now() {
                info!(
                    notification_id,
                    scheduled_at = %scheduled_at,
                    "Delivering ahead of scheduledAt, scheduling is not enforced"
                );
            }
        }

        let formatted = format_envelope(&envelope);

        if self.provider.status() == ProviderStatus::Disabled {
            warn!(
                notification_id,
                channel = %self.channel,
                "Provider disabled, rejecting notification"
            );
            return DeliveryOutcome::rejected(
                ProviderError::Disabled {
                    channel: self.channel.as_str(),
                }
                .to_string(),
            );
        }

        let result = retry_with_backoff_if(
            &self.policy.retry,
            || self.attempt(&formatted),
            ProviderError::is_transient,
        )
        .await;

        match result {
            Ok(()) => {
                info!(notification_id, channel = %self.channel, "Notification delivered");
                DeliveryOutcome::Acknowledged
            }
            Err(e) => {
                error!(
                    notification_id,
                    channel = %self.channel,
                    error = %e,
                    "Delivery failed, notification dropped"
                );
                DeliveryOutcome::rejected(e.to_string())
            }
        }
    }

    async fn attempt(&self, notification: &FormattedNotification) -> Result<(), ProviderError> {
        match timeout(self.policy.provider_timeout, self.provider.send(notification)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(
                self.policy.provider_timeout.as_millis() as u64,
            )),
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) {
        let Some(failed_queue) = &self.policy.failed_queue else {
            return;
        };

        let envelope = NotificationEnvelope::decode(&delivery.data).ok();
        let priority = envelope
            .as_ref()
            .map_or(DEFAULT_PRIORITY_WEIGHT, |e| e.request.priority.weight());

        let record = DeadLetter {
            raw_payload: envelope
                .is_none()
                .then(|| String::from_utf8_lossy(&delivery.data).into_owned()),
            envelope,
            source_queue: delivery.queue.clone(),
            failure_reason: reason.to_string(),
            failed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        let published = match serde_json::to_vec(&record) {
            Ok(payload) => self.broker.publish(failed_queue, &payload, priority).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = published {
            error!(
                queue = %failed_queue,
                delivery_tag = delivery.delivery_tag,
                error = %e,
                "Failed to publish to failed queue, notification lost"
            );
        }
    }
}

/// Starts one independent consumer task per provider. Each task resolves to
/// its channel and the consumer's result.
pub fn spawn_channel_consumers(
    broker: Arc<dyn MessageBroker>,
    providers: &[Arc<dyn DeliveryProvider>],
    policy: DeliveryPolicy,
    shutdown: watch::Receiver<bool>,
) -> JoinSet<(NotificationType, Result<(), Error>)> {
    let mut consumers = JoinSet::new();

    for provider in providers {
        let consumer = ChannelConsumer::new(broker.clone(), provider.clone(), policy.clone());
        let shutdown = shutdown.clone();

        consumers.spawn(async move {
            let channel = consumer.channel();
            (channel, consumer.run(shutdown).await)
        });
    }

    consumers
}
