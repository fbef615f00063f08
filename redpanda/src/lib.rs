//! Redpanda event bus for the listings catalog.
//!
//! [`RedpandaEventBus`] implements the [`EventBus`] trait from `listings-core`
//! on top of rdkafka, so it works against Redpanda or any other
//! Kafka-compatible broker.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - A message is committed only after its [`Delivery`] is acknowledged
//! - `retry(delay)` re-presents the same message after `delay`; later messages
//!   of the partition wait, so per-partition order is preserved
//! - After `max_deliveries` attempts (default 10) the message is copied to the
//!   dead-letter topic (default `listings.DLT`) and committed
//! - If the process crashes before commit, the message is redelivered
//!
//! ```text
//!   poll ──► Delivery(attempt n) ──► subscriber
//!                                       │
//!              ┌──────── ack ───────────┤
//!              ▼                        │ retry(delay)
//!           commit              n < max ? sleep, attempt n+1
//!              ▲                        │
//!              └──── dead-letter ◄──────┘ n == max
//! ```
//!
//! # Example
//!
//! ```no_run
//! use listings_redpanda::RedpandaEventBus;
//! use listings_core::event_bus::EventBus;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("listings-reconciler")
//!     .build()?;
//!
//! event_bus.publish("listings", Some("42"), br#"{"id":"42","mode":"DELETE"}"#).await?;
//!
//! let mut deliveries = event_bus.subscribe(&["listings"]).await?;
//! while let Some(delivery) = deliveries.next().await {
//!     let delivery = delivery?;
//!     println!("attempt {}: {} bytes", delivery.attempt(), delivery.payload().len());
//!     delivery.ack();
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use listings_core::event_bus::{
    Acknowledgement, Delivery, DeliveryStream, EventBus, EventBusError,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Default number of deliveries before a message is dead-lettered.
pub const DEFAULT_MAX_DELIVERIES: u32 = 10;

/// Default dead-letter topic.
pub const DEFAULT_DEAD_LETTER_TOPIC: &str = "listings.DLT";

/// Header carrying the number of attempts on dead-lettered records.
pub const DELIVERY_ATTEMPTS_HEADER: &str = "listings-delivery-attempts";

/// Redpanda event bus implementation.
///
/// # Configuration
///
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Producer settings**: Acks, compression, timeout
/// - **Consumer group**: Explicit ID or derived from the subscribed topics
/// - **Buffer size**: Deliveries buffered per subscription (default: 1000)
/// - **Offset reset**: Where new groups start reading (default: "latest")
/// - **Redelivery bound**: `max_deliveries` and `dead_letter_topic`
///
/// # Example
///
/// ```no_run
/// use listings_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::new("localhost:9092")?;
///
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .producer_acks("all")
///     .max_deliveries(Some(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing and dead-lettering
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    /// Consumer group ID (if explicitly set)
    consumer_group: Option<String>,
    /// Delivery buffer size for subscribers
    buffer_size: usize,
    /// Auto offset reset policy
    auto_offset_reset: String,
    /// Redelivery bound, `None` for unbounded
    max_deliveries: Option<u32>,
    /// Where exhausted messages are copied
    dead_letter_topic: String,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Redelivery bound, `None` when unbounded.
    #[must_use]
    pub const fn max_deliveries(&self) -> Option<u32> {
        self.max_deliveries
    }

    /// Topic exhausted messages are copied to.
    #[must_use]
    pub fn dead_letter_topic(&self) -> &str {
        &self.dead_letter_topic
    }

    fn consumer_group_for(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            // Sorted for deterministic naming
            let mut sorted = topics.to_vec();
            sorted.sort();
            format!("listings-{}", sorted.join("-"))
        })
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
    max_deliveries: Option<Option<u32>>,
    dead_letter_topic: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: `"0"`, `"1"` or `"all"`.
    ///
    /// Default: `"all"`, so a publish returns only once the write is durable.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: `"none"`, `"gzip"`, `"snappy"`, `"lz4"`, `"zstd"`.
    ///
    /// Default: `"none"`
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID for subscriptions.
    ///
    /// Every subscription created by the bus joins this group, so several
    /// reconciler workers share the topic's partitions. If not set, the group
    /// is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set how many deliveries may be buffered between the consumer and the
    /// subscriber.
    ///
    /// Values below 1 are raised to 1.
    ///
    /// Default: 1000
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set the auto offset reset policy for new consumer groups
    /// (`"earliest"`, `"latest"` or `"error"`).
    ///
    /// Default: `"latest"`
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Bound the number of deliveries of one message.
    ///
    /// `None` redelivers until the subscriber acknowledges. `Some(0)` is
    /// treated as `Some(1)`.
    ///
    /// Default: `Some(10)`
    #[must_use]
    pub const fn max_deliveries(mut self, max_deliveries: Option<u32>) -> Self {
        self.max_deliveries = Some(max_deliveries);
        self
    }

    /// Set the dead-letter topic.
    ///
    /// Default: `"listings.DLT"`
    #[must_use]
    pub fn dead_letter_topic(mut self, topic: impl Into<String>) -> Self {
        self.dead_letter_topic = Some(topic.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let compression = self.compression.unwrap_or_else(|| "none".to_string());
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", &acks)
            .set("compression.type", &compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let max_deliveries = self
            .max_deliveries
            .unwrap_or(Some(DEFAULT_MAX_DELIVERIES))
            .map(|max| max.max(1));
        let dead_letter_topic = self
            .dead_letter_topic
            .unwrap_or_else(|| DEFAULT_DEAD_LETTER_TOPIC.to_string());
        let buffer_size = self.buffer_size.unwrap_or(1000);
        let auto_offset_reset = self.auto_offset_reset.unwrap_or_else(|| "latest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks = %acks,
            compression = %compression,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            max_deliveries = ?max_deliveries,
            dead_letter_topic = %dead_letter_topic,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
            max_deliveries,
            dead_letter_topic,
        })
    }
}

/// What the consumer task does with a message once its delivery is settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Commit,
    Redeliver(Duration),
    DeadLetter,
}

/// `settled` is `None` when the delivery was dropped unsettled.
fn next_step(settled: Option<Acknowledgement>, attempt: u32, max_deliveries: Option<u32>) -> Step {
    let delay = match settled {
        Some(Acknowledgement::Ack) => return Step::Commit,
        Some(Acknowledgement::Retry(delay)) => delay,
        None => Duration::ZERO,
    };
    match max_deliveries {
        Some(max) if attempt >= max => Step::DeadLetter,
        _ => Step::Redeliver(delay),
    }
}

async fn send(
    producer: &FutureProducer,
    timeout: Duration,
    topic: &str,
    key: Option<&str>,
    payload: &[u8],
    headers: Option<OwnedHeaders>,
) -> Result<(i32, i64), EventBusError> {
    let mut record = FutureRecord::<str, [u8]>::to(topic).payload(payload);
    if let Some(key) = key {
        record = record.key(key);
    }
    if let Some(headers) = headers {
        record = record.headers(headers);
    }

    producer
        .send(record, Timeout::After(timeout))
        .await
        .map_err(|(kafka_error, _)| EventBusError::PublishFailed {
            topic: topic.to_string(),
            reason: kafka_error.to_string(),
        })
}

impl EventBus for RedpandaEventBus {
    fn publish<'a>(
        &'a self,
        topic: &'a str,
        key: Option<&'a str>,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            match send(&self.producer, self.timeout, topic, key, payload, None).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        key = ?key,
                        partition,
                        offset,
                        "Payload published"
                    );
                    Ok(())
                },
                Err(e) => {
                    tracing::error!(topic = %topic, error = %e, "Failed to publish payload");
                    Err(e)
                },
            }
        })
    }

    #[allow(clippy::too_many_lines)] // One consumer loop owns polling, settling and committing
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let consumer_group_id = self.consumer_group_for(&topics);
        let brokers = self.brokers.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();
        let max_deliveries = self.max_deliveries;
        let dead_letter_topic = self.dead_letter_topic.clone();
        let producer = self.producer.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            if topics.is_empty() {
                return Err(EventBusError::SubscriptionFailed {
                    topics,
                    reason: "No topics given".to_string(),
                });
            }

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| EventBusError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                buffer_size,
                auto_offset_reset = %auto_offset_reset,
                max_deliveries = ?max_deliveries,
                "Subscribed to topics"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

            // The task owns the consumer; a message is settled before the next
            // one is polled, which keeps partition order across redeliveries.
            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();

                'poll: while let Some(msg_result) = stream.next().await {
                    let message = match msg_result {
                        Ok(message) => message,
                        Err(e) => {
                            let err = EventBusError::TransportError(format!(
                                "Failed to receive message: {e}"
                            ));
                            if tx.send(Err(err)).await.is_err() {
                                break;
                            }
                            continue;
                        },
                    };

                    let topic = message.topic().to_string();
                    let key = message
                        .key()
                        .map(|k| String::from_utf8_lossy(k).into_owned());
                    let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();

                    let mut attempt = 1u32;
                    loop {
                        let (delivery, settlement) =
                            Delivery::new(topic.clone(), key.clone(), payload.clone(), attempt);
                        if tx.send(Ok(delivery)).await.is_err() {
                            tracing::debug!("Subscriber dropped, exiting consumer task");
                            // Not committed, so the group redelivers it
                            break 'poll;
                        }

                        let settled = settlement.await.ok();
                        if settled.is_none() && tx.is_closed() {
                            break 'poll;
                        }

                        match next_step(settled, attempt, max_deliveries) {
                            Step::Commit => break,
                            Step::Redeliver(delay) => {
                                tracing::debug!(
                                    topic = %topic,
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    attempt,
                                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                    "Redelivering message"
                                );
                                tokio::time::sleep(delay).await;
                                attempt = attempt.saturating_add(1);
                            },
                            Step::DeadLetter => {
                                let attempts = attempt.to_string();
                                let headers = OwnedHeaders::new().insert(Header {
                                    key: DELIVERY_ATTEMPTS_HEADER,
                                    value: Some(attempts.as_bytes()),
                                });
                                match send(
                                    &producer,
                                    timeout,
                                    &dead_letter_topic,
                                    key.as_deref(),
                                    &payload,
                                    Some(headers),
                                )
                                .await
                                {
                                    Ok(_) => {
                                        tracing::warn!(
                                            topic = %topic,
                                            partition = message.partition(),
                                            offset = message.offset(),
                                            attempts = attempt,
                                            dead_letter_topic = %dead_letter_topic,
                                            "Message dead-lettered after exhausting deliveries"
                                        );
                                        break;
                                    },
                                    Err(e) => {
                                        // Stays uncommitted and is offered again
                                        tracing::error!(
                                            dead_letter_topic = %dead_letter_topic,
                                            error = %e,
                                            "Failed to dead-letter message"
                                        );
                                        tokio::time::sleep(timeout).await;
                                    },
                                }
                            },
                        }
                    }

                    if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                        tracing::warn!(
                            topic = message.topic(),
                            partition = message.partition(),
                            offset = message.offset(),
                            error = %e,
                            "Failed to commit offset (message may be redelivered)"
                        );
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}
