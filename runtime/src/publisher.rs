//! Producer side of the listings topic.

use crate::metrics::PublisherMetrics;
use listings_core::event::{ChangeEvent, EventError};
use listings_core::event_bus::{EventBus, EventBusError};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced to callers of [`ListingEventPublisher::publish`].
#[derive(Error, Debug)]
pub enum PublishError {
    /// The event could not be encoded
    #[error("Failed to encode change event: {0}")]
    Encode(#[from] EventError),

    /// The broker did not confirm the write
    #[error("Failed to publish change event: {0}")]
    Bus(#[from] EventBusError),
}

/// Publishes change events to the listings topic.
///
/// Records are keyed by listing id when the event carries one, so every event
/// for the same listing lands on the same partition and is consumed in order.
#[derive(Clone)]
pub struct ListingEventPublisher {
    bus: Arc<dyn EventBus>,
    topic: String,
}

impl ListingEventPublisher {
    /// Create a publisher for `topic`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    /// Topic events are published to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish one change event and wait for broker confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if encoding fails or the broker does not confirm.
    pub async fn publish(&self, event: &ChangeEvent) -> Result<(), PublishError> {
        let payload = event.encode()?;
        let key = event.listing_id();

        match self.bus.publish(&self.topic, key, &payload).await {
            Ok(()) => {
                PublisherMetrics::record_publish();
                tracing::info!(
                    topic = %self.topic,
                    mode = ?event.mode,
                    id = ?key,
                    "Change event published"
                );
                Ok(())
            },
            Err(e) => {
                PublisherMetrics::record_publish_error();
                tracing::error!(topic = %self.topic, error = %e, "Failed to publish change event");
                Err(e.into())
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use listings_testing::{InMemoryEventBus, create_event, delete_event, payload};

    #[tokio::test]
    async fn keys_records_by_listing_id() {
        let bus = InMemoryEventBus::new();
        let publisher = ListingEventPublisher::new(Arc::new(bus.clone()), "listings");

        publisher.publish(&delete_event("42")).await.unwrap();
        publisher.publish(&create_event()).await.unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].key.as_deref(), Some("42"));
        assert_eq!(published[0].payload, payload(&delete_event("42")));
        assert_eq!(published[1].key, None);
        assert!(published.iter().all(|r| r.topic == "listings"));
    }

    #[tokio::test]
    async fn broker_failure_is_a_hard_error() {
        let bus = InMemoryEventBus::new();
        bus.set_publish_failure(true);
        let publisher = ListingEventPublisher::new(Arc::new(bus), "listings");

        let err = publisher.publish(&delete_event("1")).await.unwrap_err();
        assert!(matches!(err, PublishError::Bus(EventBusError::PublishFailed { .. })));
    }
}
