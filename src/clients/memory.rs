//! In-process broker and store with the same acknowledge/reject semantics as
//! the real collaborators. Used by the test suite and for running the
//! pipeline without RabbitMQ or PostgreSQL. The published, acknowledged and
//! rejected logs keep only the most recent `HISTORY_LIMIT` messages each.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tokio::sync::{Mutex, Notify};
use tracing::debug;
use uuid::Uuid;

use crate::{
    clients::{Delivery, DeliveryStream, MessageBroker, NotificationStore},
    models::{notification::NotificationRequest, preferences::UserPreferences},
};

pub const HISTORY_LIMIT: usize = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub queue: String,
    pub payload: Vec<u8>,
    pub priority: u8,
    pub redelivered: bool,
}

#[derive(Default)]
struct BrokerState {
    declared: HashSet<String>,
    queues: HashMap<String, VecDeque<StoredMessage>>,
    in_flight: HashMap<u64, StoredMessage>,
    consumers: HashSet<String>,
    published: VecDeque<StoredMessage>,
    acknowledged: VecDeque<StoredMessage>,
    rejected: VecDeque<StoredMessage>,
}

fn record(log: &mut VecDeque<StoredMessage>, message: StoredMessage) {
    if log.len() == HISTORY_LIMIT {
        log.pop_front();
    }
    log.push_back(message);
}

enum Pull {
    Delivered(Delivery),
    Empty,
    Cancelled,
}

#[derive(Default)]
struct BrokerInner {
    state: Mutex<BrokerState>,
    available: Notify,
    next_tag: AtomicU64,
    closed: AtomicBool,
    fail_publish: AtomicBool,
}

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail, as an unreachable broker would.
    pub fn fail_publishes(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Ends every consumer stream, as a dropped connection would.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.available.notify_waiters();
    }

    pub async fn queue_depth(&self, queue: &str) -> usize {
        let state = self.inner.state.lock().await;
        state.queues.get(queue).map_or(0, VecDeque::len)
    }

    pub async fn in_flight(&self) -> usize {
        self.inner.state.lock().await.in_flight.len()
    }

    pub async fn published(&self) -> Vec<StoredMessage> {
        self.inner.state.lock().await.published.iter().cloned().collect()
    }

    pub async fn acknowledged(&self) -> Vec<StoredMessage> {
        self.inner.state.lock().await.acknowledged.iter().cloned().collect()
    }

    pub async fn rejected(&self) -> Vec<StoredMessage> {
        self.inner.state.lock().await.rejected.iter().cloned().collect()
    }

    /// Consumer tags subscribed and not yet cancelled.
    pub async fn active_consumers(&self) -> HashSet<String> {
        self.inner.state.lock().await.consumers.clone()
    }

    pub async fn declared_queues(&self) -> HashSet<String> {
        self.inner.state.lock().await.declared.clone()
    }
}

impl BrokerInner {
    async fn pull(&self, queue: &str, consumer_tag: &str) -> Pull {
        let mut state = self.state.lock().await;
        if !state.consumers.contains(consumer_tag) {
            return Pull::Cancelled;
        }
        let Some(message) = state.queues.get_mut(queue).and_then(VecDeque::pop_front) else {
            return Pull::Empty;
        };
        let delivery_tag = self.next_tag.fetch_add(1, Ordering::SeqCst) + 1;

        let delivery = Delivery {
            delivery_tag,
            queue: message.queue.clone(),
            data: message.payload.clone(),
            redelivered: message.redelivered,
        };
        state.in_flight.insert(delivery_tag, message);

        Pull::Delivered(delivery)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_queues(&self, queues: &[&str]) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        for queue in queues {
            state.declared.insert(queue.to_string());
            state.queues.entry(queue.to_string()).or_default();
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8], priority: u8) -> Result<(), Error> {
        if self.inner.fail_publish.load(Ordering::SeqCst) || self.inner.closed.load(Ordering::SeqCst)
        {
            return Err(anyhow!("Broker unavailable"));
        }

        let message = StoredMessage {
            queue: queue.to_string(),
            payload: payload.to_vec(),
            priority,
            redelivered: false,
        };

        {
            let mut state = self.inner.state.lock().await;
            let Some(messages) = state.queues.get_mut(queue) else {
                return Err(anyhow!("Queue {} has not been declared", queue));
            };
            messages.push_back(message.clone());
            record(&mut state.published, message);
        }

        debug!(queue = %queue, priority, "Message stored in memory queue");
        self.inner.available.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, Error> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(anyhow!("Broker connection is closed"));
        }

        {
            let mut state = self.inner.state.lock().await;
            if !state.declared.contains(queue) {
                return Err(anyhow!("Queue {} has not been declared", queue));
            }
            state.consumers.insert(consumer_tag.to_string());
        }

        let deliveries = stream::unfold(
            (Arc::clone(&self.inner), queue.to_string(), consumer_tag.to_string()),
            |(inner, queue, consumer_tag)| async move {
                loop {
                    let available = inner.available.notified();

                    if inner.closed.load(Ordering::SeqCst) {
                        return None;
                    }

                    match inner.pull(&queue, &consumer_tag).await {
                        Pull::Delivered(delivery) => {
                            drop(available);
                            return Some((Ok(delivery), (inner, queue, consumer_tag)));
                        }
                        Pull::Cancelled => return None,
                        Pull::Empty => {}
                    }

                    available.await;
                }
            },
        );

        Ok(deliveries.boxed())
    }

    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        let mut state = self.inner.state.lock().await;
        let message = state
            .in_flight
            .remove(&delivery_tag)
            .ok_or_else(|| anyhow!("Unknown delivery tag {}", delivery_tag))?;
        record(&mut state.acknowledged, message);
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        {
            let mut state = self.inner.state.lock().await;
            let mut message = state
                .in_flight
                .remove(&delivery_tag)
                .ok_or_else(|| anyhow!("Unknown delivery tag {}", delivery_tag))?;

            if !requeue {
                record(&mut state.rejected, message);
                return Ok(());
            }

            message.redelivered = true;
            let queue = message.queue.clone();
            state.queues.entry(queue).or_default().push_front(message);
        }

        self.inner.available.notify_waiters();
        Ok(())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), Error> {
        self.inner.state.lock().await.consumers.remove(consumer_tag);
        self.inner.available.notify_waiters();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct InMemoryNotificationStore {
    records: Mutex<Vec<(Uuid, NotificationRequest)>>,
    preferences: Mutex<HashMap<String, UserPreferences>>,
    fail_writes: AtomicBool,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn set_preferences(&self, preferences: UserPreferences) {
        self.preferences
            .lock()
            .await
            .insert(preferences.user_id.clone(), preferences);
    }

    pub async fn get(&self, id: Uuid) -> Option<NotificationRequest> {
        self.records
            .lock()
            .await
            .iter()
            .find(|(record_id, _)| *record_id == id)
            .map(|(_, request)| request.clone())
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, request: &NotificationRequest) -> Result<Uuid, Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("Database write failed: connection refused"));
        }

        let id = Uuid::new_v4();
        self.records.lock().await.push((id, request.clone()));
        Ok(id)
    }

    async fn lookup_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>, Error> {
        Ok(self.preferences.lock().await.get(user_id).cloned())
    }

    async fn health_check(&self) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("Database unavailable"));
        }
        Ok(())
    }
}
