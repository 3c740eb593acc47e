//! Handles to the external collaborators of the pipeline: the durable queue
//! broker and the notification store.

pub mod database;
pub mod health;
pub mod memory;
pub mod rbmq;

use anyhow::{Error, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use uuid::Uuid;

use crate::models::{notification::NotificationRequest, preferences::UserPreferences};

/// A message pulled from a queue and not yet acknowledged or rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub queue: String,
    pub data: Vec<u8>,
    pub redelivered: bool,
}

pub type DeliveryStream = BoxStream<'static, Result<Delivery, Error>>;

#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declares each queue durable. Must run before anything is published.
    async fn declare_queues(&self, queues: &[&str]) -> Result<(), Error>;

    /// Publishes a persistent message and waits for the broker to confirm it.
    async fn publish(&self, queue: &str, payload: &[u8], priority: u8) -> Result<(), Error>;

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, Error>;

    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error>;

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error>;

    /// Stops the consumer registered under `consumer_tag`; its stream ends.
    async fn cancel(&self, consumer_tag: &str) -> Result<(), Error>;

    fn is_connected(&self) -> bool;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persists the request and returns its generated id.
    async fn insert(&self, request: &NotificationRequest) -> Result<Uuid, Error>;

    async fn lookup_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, Error>;

    async fn health_check(&self) -> Result<(), Error>;
}
