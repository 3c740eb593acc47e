use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tracing::{debug, info};

use crate::{
    clients::{Delivery, DeliveryStream, MessageBroker},
    config::Config,
    routing::ALL_QUEUES,
};

/// One connection and one channel, shared by the dispatcher and every
/// channel consumer.
pub struct RabbitMqClient {
    connection: Connection,
    channel: Channel,
    queue_max_priority: Option<u8>,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {}", e))?;

        info!("RabbitMQ connection established");

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {}", e))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {}", e))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to enable publisher confirms: {}", e))?;

        debug!(prefetch_count = config.prefetch_count, "RabbitMQ channel configured");

        let client = Self {
            connection,
            channel,
            queue_max_priority: config.queue_max_priority,
        };

        client.declare_queues(&ALL_QUEUES).await?;

        if let Some(failed_queue) = &config.failed_queue_name {
            client.declare_queue(failed_queue, FieldTable::default()).await?;
            info!(queue = %failed_queue, "Failed queue declared");
        }

        Ok(client)
    }

    async fn declare_queue(&self, queue: &str, arguments: FieldTable) -> Result<(), Error> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                arguments,
            )
            .await
            .map_err(|e| anyhow!("Failed to declare queue {}: {}", queue, e))?;

        Ok(())
    }

    fn queue_arguments(&self) -> FieldTable {
        let mut arguments = FieldTable::default();
        if let Some(max_priority) = self.queue_max_priority {
            arguments.insert(
                "x-max-priority".into(),
                AMQPValue::ShortShortUInt(max_priority),
            );
        }
        arguments
    }
}

#[async_trait]
impl MessageBroker for RabbitMqClient {
    async fn declare_queues(&self, queues: &[&str]) -> Result<(), Error> {
        for queue in queues {
            self.declare_queue(queue, self.queue_arguments()).await?;
            debug!(queue = %queue, "Queue declared");
        }

        info!(count = queues.len(), "Notification queues declared");
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8], priority: u8) -> Result<(), Error> {
        let confirm = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_priority(priority)
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish message to {}: {}", queue, e))?;

        let confirmation = confirm
            .await
            .map_err(|e| anyhow!("Publisher confirm failed for {}: {}", queue, e))?;

        if confirmation.is_nack() {
            return Err(anyhow!("Broker refused message for {}", queue));
        }

        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, Error> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer for {}: {}", queue, e))?;

        info!(queue = %queue, consumer_tag = %consumer_tag, "Consumer created for queue");

        let queue = queue.to_string();
        let deliveries = consumer.map(move |result| {
            result
                .map(|delivery| Delivery {
                    delivery_tag: delivery.delivery_tag,
                    queue: queue.clone(),
                    data: delivery.data,
                    redelivered: delivery.redelivered,
                })
                .map_err(|e| anyhow!("Consumer stream for {} failed: {}", queue, e))
        });

        Ok(deliveries.boxed())
    }

    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to acknowledge message: {}", e))?;

        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| anyhow!("Failed to reject message: {}", e))?;

        Ok(())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), Error> {
        self.channel
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to cancel consumer {}: {}", consumer_tag, e))?;

        debug!(consumer_tag = %consumer_tag, "Consumer cancelled");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}
