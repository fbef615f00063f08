//! In-memory event bus for tests
//!
//! [`InMemoryEventBus`] gives every topic one shared queue, so all subscriptions
//! behave like members of a single consumer group: each message is handed to
//! exactly one subscriber. Settlements are recorded, retried messages are
//! re-queued after their delay, and an optional delivery bound moves exhausted
//! messages to a dead-letter list.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use futures::stream::{self, StreamExt};
use listings_core::event_bus::{
    Acknowledgement, Delivery, DeliveryStream, EventBus, EventBusError, Settlement,
};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A published message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    /// Destination topic
    pub topic: String,
    /// Record key
    pub key: Option<String>,
    /// Message body
    pub payload: Vec<u8>,
}

/// How one delivery attempt ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settled {
    /// The delivered message
    pub record: Record,
    /// 1-based attempt number
    pub attempt: u32,
    /// Settlement, or `None` if the delivery was dropped unsettled
    pub acknowledgement: Option<Acknowledgement>,
}

#[derive(Debug)]
struct Pending {
    record: Record,
    attempt: u32,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Pending>>>;

#[derive(Debug)]
struct Queue {
    tx: mpsc::UnboundedSender<Pending>,
    rx: SharedReceiver,
}

#[derive(Debug, Default)]
struct Inner {
    queues: Mutex<HashMap<String, Queue>>,
    published: Mutex<Vec<Record>>,
    settled: Mutex<Vec<Settled>>,
    dead_letters: Mutex<Vec<Record>>,
    fail_publish: AtomicBool,
    max_deliveries: Option<u32>,
}

impl Inner {
    fn receiver(&self, topic: &str) -> SharedReceiver {
        let mut queues = self.queues.lock().unwrap();
        Arc::clone(&queues.entry(topic.to_string()).or_insert_with(new_queue).rx)
    }

    fn enqueue(&self, pending: Pending) {
        let mut queues = self.queues.lock().unwrap();
        let queue = queues
            .entry(pending.record.topic.clone())
            .or_insert_with(new_queue);
        // The receiver lives in the same map entry, so the send cannot fail.
        let _ = queue.tx.send(pending);
    }
}

fn new_queue() -> Queue {
    let (tx, rx) = mpsc::unbounded_channel();
    Queue {
        tx,
        rx: Arc::new(tokio::sync::Mutex::new(rx)),
    }
}

/// In-memory event bus for fast, deterministic testing.
///
/// # Example
///
/// ```
/// use listings_testing::InMemoryEventBus;
/// use listings_core::event_bus::EventBus;
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let mut deliveries = bus.subscribe(&["listings"]).await?;
///
/// bus.publish("listings", Some("42"), br#"{"id":"42","mode":"DELETE"}"#).await?;
///
/// let delivery = deliveries.next().await.unwrap()?;
/// assert_eq!(delivery.key(), Some("42"));
/// delivery.ack();
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl InMemoryEventBus {
    /// Create a bus with unbounded redelivery.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus that dead-letters a message after `max` delivery attempts.
    #[must_use]
    pub fn with_max_deliveries(max: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_deliveries: Some(max),
                ..Inner::default()
            }),
        }
    }

    /// Make subsequent publishes fail.
    pub fn set_publish_failure(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Every successfully published message, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<Record> {
        self.inner.published.lock().unwrap().clone()
    }

    /// Every settled delivery attempt, in settlement order.
    #[must_use]
    pub fn settlements(&self) -> Vec<Settled> {
        self.inner.settled.lock().unwrap().clone()
    }

    /// Messages that exhausted their delivery attempts.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<Record> {
        self.inner.dead_letters.lock().unwrap().clone()
    }

    /// Wait until at least `count` delivery attempts have been settled.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for_settlements(&self, count: usize, timeout: Duration) -> bool {
        let poll = async {
            while self.inner.settled.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    fn topic_stream(&self, topic: &str) -> DeliveryStream {
        let inner = Arc::clone(&self.inner);
        let rx = inner.receiver(topic);

        let stream = async_stream::stream! {
            loop {
                let next = rx.lock().await.recv().await;
                let Some(pending) = next else { break };

                let (delivery, settlement) = Delivery::new(
                    pending.record.topic.clone(),
                    pending.record.key.clone(),
                    pending.record.payload.clone(),
                    pending.attempt,
                );
                tokio::spawn(settle(Arc::clone(&inner), pending, settlement));
                yield Ok(delivery);
            }
        };

        Box::pin(stream)
    }
}

async fn settle(inner: Arc<Inner>, pending: Pending, settlement: Settlement) {
    let acknowledgement = settlement.await.ok();
    inner.settled.lock().unwrap().push(Settled {
        record: pending.record.clone(),
        attempt: pending.attempt,
        acknowledgement,
    });

    let delay = match acknowledgement {
        Some(Acknowledgement::Ack) => return,
        Some(Acknowledgement::Retry(delay)) => delay,
        None => Duration::ZERO,
    };

    if inner
        .max_deliveries
        .is_some_and(|max| pending.attempt >= max)
    {
        inner.dead_letters.lock().unwrap().push(pending.record);
        return;
    }

    tokio::time::sleep(delay).await;
    inner.enqueue(Pending {
        record: pending.record,
        attempt: pending.attempt + 1,
    });
}

impl EventBus for InMemoryEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: Option<&'a str>,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            if self.inner.fail_publish.load(Ordering::SeqCst) {
                return Err(EventBusError::PublishFailed {
                    topic: topic.to_string(),
                    reason: "publish failure injected".to_string(),
                });
            }

            let record = Record {
                topic: topic.to_string(),
                key: key.map(str::to_string),
                payload: payload.to_vec(),
            };
            self.inner.published.lock().unwrap().push(record.clone());
            self.inner.enqueue(Pending { record, attempt: 1 });
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let streams: Vec<DeliveryStream> = topics.iter().map(|t| self.topic_stream(t)).collect();

        Box::pin(async move {
            if streams.is_empty() {
                return Err(EventBusError::SubscriptionFailed {
                    topics: Vec::new(),
                    reason: "no topics given".to_string(),
                });
            }
            Ok(stream::select_all(streams).boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn ack_settles_once() {
        let bus = InMemoryEventBus::new();
        let mut deliveries = bus.subscribe(&["listings"]).await.unwrap();
        bus.publish("listings", None, b"one").await.unwrap();

        deliveries.next().await.unwrap().unwrap().ack();
        assert!(bus.wait_for_settlements(1, WAIT).await);

        let settled = bus.settlements();
        assert_eq!(settled[0].attempt, 1);
        assert_eq!(settled[0].acknowledgement, Some(Acknowledgement::Ack));
    }

    #[tokio::test]
    async fn retry_redelivers_with_next_attempt() {
        let bus = InMemoryEventBus::new();
        let mut deliveries = bus.subscribe(&["listings"]).await.unwrap();
        bus.publish("listings", Some("k"), b"again").await.unwrap();

        let first = deliveries.next().await.unwrap().unwrap();
        assert_eq!(first.attempt(), 1);
        first.retry(Duration::from_millis(1));

        let second = deliveries.next().await.unwrap().unwrap();
        assert_eq!(second.attempt(), 2);
        assert_eq!(second.payload(), b"again");
        second.ack();
        assert!(bus.wait_for_settlements(2, WAIT).await);
    }

    #[tokio::test]
    async fn dropped_delivery_is_redelivered() {
        let bus = InMemoryEventBus::new();
        let mut deliveries = bus.subscribe(&["listings"]).await.unwrap();
        bus.publish("listings", None, b"dropped").await.unwrap();

        drop(deliveries.next().await.unwrap().unwrap());
        let again = deliveries.next().await.unwrap().unwrap();
        assert_eq!(again.attempt(), 2);
        again.ack();
    }

    #[tokio::test]
    async fn exhausted_messages_are_dead_lettered() {
        let bus = InMemoryEventBus::with_max_deliveries(2);
        let mut deliveries = bus.subscribe(&["listings"]).await.unwrap();
        bus.publish("listings", None, b"poison").await.unwrap();

        deliveries.next().await.unwrap().unwrap().retry(Duration::ZERO);
        deliveries.next().await.unwrap().unwrap().retry(Duration::ZERO);
        assert!(bus.wait_for_settlements(2, WAIT).await);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(bus.dead_letters().len(), 1);
        assert_eq!(bus.dead_letters()[0].payload, b"poison");
    }

    #[tokio::test]
    async fn subscribers_share_the_topic() {
        let bus = InMemoryEventBus::new();
        let mut first = bus.subscribe(&["listings"]).await.unwrap();
        let mut second = bus.subscribe(&["listings"]).await.unwrap();
        bus.publish("listings", None, b"a").await.unwrap();
        bus.publish("listings", None, b"b").await.unwrap();

        let a = first.next().await.unwrap().unwrap();
        let b = second.next().await.unwrap().unwrap();
        assert_ne!(a.payload(), b.payload());
        a.ack();
        b.ack();
    }

    #[tokio::test]
    async fn publish_failure_is_reported() {
        let bus = InMemoryEventBus::new();
        bus.set_publish_failure(true);
        let err = bus.publish("listings", None, b"x").await.unwrap_err();
        assert!(matches!(err, EventBusError::PublishFailed { .. }));
        assert!(bus.published().is_empty());
    }
}
