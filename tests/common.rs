use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use notification_dispatch::{
    clients::{
        MessageBroker, NotificationStore,
        memory::{InMemoryBroker, InMemoryNotificationStore},
    },
    consumer::DeliveryPolicy,
    dispatch::DispatchService,
    error::ProviderError,
    formatter::FormattedNotification,
    models::{notification::NotificationType, retry::RetryConfig},
    providers::{DeliveryProvider, ProviderStatus},
    routing::ALL_QUEUES,
};
use tokio::{sync::Mutex, time::sleep};

pub enum Behavior {
    Succeed,
    AlwaysFail(ProviderError),
    FailFirst(u32, ProviderError),
    Hang,
}

/// Provider double that records what it was asked to send.
pub struct FakeProvider {
    channel: NotificationType,
    behavior: Behavior,
    attempts: AtomicU32,
    sent: Mutex<Vec<FormattedNotification>>,
}

impl FakeProvider {
    pub fn new(channel: NotificationType, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            channel,
            behavior,
            attempts: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding(channel: NotificationType) -> Arc<Self> {
        Self::new(channel, Behavior::Succeed)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn sent(&self) -> Vec<FormattedNotification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl DeliveryProvider for FakeProvider {
    fn channel(&self) -> NotificationType {
        self.channel
    }

    fn status(&self) -> ProviderStatus {
        ProviderStatus::Ready
    }

    async fn send(&self, notification: &FormattedNotification) -> Result<(), ProviderError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        match &self.behavior {
            Behavior::Succeed => {}
            Behavior::AlwaysFail(e) => return Err(e.clone()),
            Behavior::FailFirst(n, e) if attempt <= *n => return Err(e.clone()),
            Behavior::FailFirst(..) => {}
            Behavior::Hang => std::future::pending::<()>().await,
        }

        self.sent.lock().await.push(notification.clone());
        Ok(())
    }
}

pub struct Pipeline {
    pub broker: InMemoryBroker,
    pub store: Arc<InMemoryNotificationStore>,
    pub dispatcher: DispatchService,
}

impl Pipeline {
    pub async fn new() -> Self {
        let broker = InMemoryBroker::new();
        broker
            .declare_queues(&ALL_QUEUES)
            .await
            .expect("declare queues");

        let store = Arc::new(InMemoryNotificationStore::new());
        let store_handle: Arc<dyn NotificationStore> = store.clone();
        let broker_handle: Arc<dyn MessageBroker> = Arc::new(broker.clone());

        Self {
            dispatcher: DispatchService::new(store_handle, broker_handle),
            broker,
            store,
        }
    }

    pub fn broker_handle(&self) -> Arc<dyn MessageBroker> {
        Arc::new(self.broker.clone())
    }
}

pub fn fast_policy() -> DeliveryPolicy {
    DeliveryPolicy {
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 5,
            max_delay_ms: 20,
            backoff_multiplier: 2,
        },
        provider_timeout: Duration::from_millis(200),
        failed_queue: None,
    }
}

/// Polls `check` until it holds, failing the test after two seconds.
pub async fn eventually<F, Fut>(description: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for: {}", description);
}
