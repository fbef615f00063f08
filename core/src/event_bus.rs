//! Event bus abstraction for the listings topic.
//!
//! The [`EventBus`] trait publishes raw payloads to topics and hands subscribers
//! a stream of [`Delivery`] values. Each delivery must be settled exactly once,
//! either with [`Delivery::ack`] (the message is done and may be committed) or
//! with [`Delivery::retry`] (the message is re-presented after a delay).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   publish    ┌─────────────┐  Delivery  ┌──────────────┐
//! │  Publisher   │ ───────────► │  Event Bus  │ ─────────► │  Reconciler  │
//! └──────────────┘              └──────┬──────┘            └──────┬───────┘
//!                                      ▲        ack / retry       │
//!                                      └──────────────────────────┘
//! ```
//!
//! # Delivery guarantees
//!
//! - **At-least-once**: a message may be delivered more than once
//! - **Ordered within partition**: records sharing a key keep their order
//! - **Commit after ack**: an unsettled message is never committed
//!
//! # Implementations
//!
//! - `InMemoryEventBus` (listings-testing) - for tests
//! - `RedpandaEventBus` (listings-redpanda) - Kafka-compatible production bus

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the event bus
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a payload to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to commit a settled message
    #[error("Commit failed: {0}")]
    CommitFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// How a delivery was settled by its consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Processing is complete; the message must not be redelivered
    Ack,
    /// The message must be redelivered after the given delay
    Retry(Duration),
}

impl Acknowledgement {
    /// Whether this is a positive acknowledgement.
    #[must_use]
    pub const fn is_ack(&self) -> bool {
        matches!(self, Self::Ack)
    }
}

/// Receiving half of a delivery's settle handle, held by the bus.
///
/// Resolves to `Err` if the delivery was dropped without being settled; buses
/// treat that as an immediate retry.
pub type Settlement = oneshot::Receiver<Acknowledgement>;

/// One presentation of a message to a subscriber.
#[derive(Debug)]
pub struct Delivery {
    topic: String,
    key: Option<String>,
    payload: Vec<u8>,
    attempt: u32,
    settle: oneshot::Sender<Acknowledgement>,
}

impl Delivery {
    /// Create a delivery and the handle on which its settlement arrives.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        key: Option<String>,
        payload: Vec<u8>,
        attempt: u32,
    ) -> (Self, Settlement) {
        let (settle, settlement) = oneshot::channel();
        let delivery = Self {
            topic: topic.into(),
            key,
            payload,
            attempt,
            settle,
        };
        (delivery, settlement)
    }

    /// Topic the message was read from.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Record key, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Raw message body.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 1-based delivery attempt of this message.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Settle the delivery.
    pub fn settle(self, acknowledgement: Acknowledgement) {
        // The bus may already have shut down; nothing left to notify.
        let _ = self.settle.send(acknowledgement);
    }

    /// Acknowledge the delivery.
    pub fn ack(self) {
        self.settle(Acknowledgement::Ack);
    }

    /// Ask for redelivery after `delay`.
    pub fn retry(self, delay: Duration) {
        self.settle(Acknowledgement::Retry(delay));
    }
}

/// Stream of deliveries from a subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Publish/subscribe transport for change events.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so that it can be shared as `Arc<dyn EventBus>` between the publisher and
/// every reconciler worker.
pub trait EventBus: Send + Sync {
    /// Publish a payload to a topic.
    ///
    /// Returns once the broker has confirmed the write.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if confirmation is not received.
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: Option<&'a str>,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>>;

    /// Subscribe to one or more topics.
    ///
    /// Subscriptions created by the same bus share one consumer group, so each
    /// message is delivered to exactly one of them.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ack_reaches_the_bus() {
        let (delivery, settlement) = Delivery::new("listings", Some("1".into()), b"{}".to_vec(), 1);
        assert_eq!(delivery.topic(), "listings");
        assert_eq!(delivery.key(), Some("1"));
        assert_eq!(delivery.attempt(), 1);

        delivery.ack();
        assert_eq!(settlement.await.unwrap(), Acknowledgement::Ack);
    }

    #[tokio::test]
    async fn retry_carries_delay() {
        let (delivery, settlement) = Delivery::new("listings", None, Vec::new(), 3);
        delivery.retry(Duration::from_millis(5));
        assert_eq!(
            settlement.await.unwrap(),
            Acknowledgement::Retry(Duration::from_millis(5))
        );
    }

    #[tokio::test]
    async fn dropped_delivery_is_unsettled() {
        let (delivery, settlement) = Delivery::new("listings", None, Vec::new(), 1);
        drop(delivery);
        assert!(settlement.await.is_err());
    }
}
