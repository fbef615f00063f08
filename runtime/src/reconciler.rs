//! Event reconciliation.
//!
//! The [`Reconciler`] applies one change event to the store and reports what
//! happened as a [`Reconciliation`]. It owns three decisions:
//!
//! - whether the event can be applied at all (decoding, business rules)
//! - which store calls the change needs (existence check, merge, save, delete)
//! - whether the broker should forget the message or present it again
//!
//! ```text
//! payload ─► decode ─► validate ─► dispatch by mode ─► store ─► evict caches
//!              │          │              │               │
//!          Malformed   Rejected    TargetMissing       Failed
//!             ACK         ACK           ACK             RETRY
//! ```
//!
//! Malformed and rejected events are acknowledged: redelivering them can never
//! succeed. Store failures are retried after a short fixed delay. Every branch
//! that changes state evicts both cache namespaces exactly once.

use crate::metrics::{CacheMetrics, ReconcilerMetrics};
use listings_core::cache::{CacheNamespace, ListingCache};
use listings_core::environment::Clock;
use listings_core::event::{ChangeEvent, ChangeMode};
use listings_core::event_bus::Acknowledgement;
use listings_core::merge::merge;
use listings_core::store::{ListingStore, StoreError};
use listings_core::validation::{Change, Violation, validate};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Delay before a failed event is presented again.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Result of reconciling one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reconciliation {
    /// The change was written to the store.
    Applied {
        /// Requested operation
        mode: ChangeMode,
        /// Affected listing
        id: String,
    },
    /// UPDATE or DELETE of a listing that does not exist; nothing was written.
    TargetMissing {
        /// Requested operation
        mode: ChangeMode,
        /// Requested listing
        id: String,
    },
    /// The payload is not a decodable change event.
    Malformed(String),
    /// The event violates a business rule.
    Rejected(Violation),
    /// The store failed while applying the change.
    Failed(StoreError),
}

impl Reconciliation {
    /// Metric label for this outcome.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::TargetMissing { .. } => "target_missing",
            Self::Malformed(_) => "malformed",
            Self::Rejected(_) => "rejected",
            Self::Failed(_) => "failed",
        }
    }

    /// Whether the store was modified.
    #[must_use]
    pub const fn changed_state(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied { mode, id } => write!(f, "{mode} applied to {id}"),
            Self::TargetMissing { mode, id } => write!(f, "{mode} target {id} not found"),
            Self::Malformed(reason) => write!(f, "malformed payload: {reason}"),
            Self::Rejected(violation) => write!(f, "rejected: {violation}"),
            Self::Failed(error) => write!(f, "failed: {error}"),
        }
    }
}

/// Applies change events to the listing store.
///
/// Holds no per-event state; one instance is shared by every worker.
pub struct Reconciler {
    store: Arc<dyn ListingStore>,
    cache: Arc<dyn ListingCache>,
    clock: Arc<dyn Clock>,
    retry_delay: Duration,
}

impl Reconciler {
    /// Create a reconciler with the default retry delay.
    #[must_use]
    pub fn new(
        store: Arc<dyn ListingStore>,
        cache: Arc<dyn ListingCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache,
            clock,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Set the delay requested when an event has to be retried.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Settlement the broker should receive for `reconciliation`.
    #[must_use]
    pub const fn acknowledgement(&self, reconciliation: &Reconciliation) -> Acknowledgement {
        match reconciliation {
            Reconciliation::Failed(_) => Acknowledgement::Retry(self.retry_delay),
            Reconciliation::Applied { .. }
            | Reconciliation::TargetMissing { .. }
            | Reconciliation::Malformed(_)
            | Reconciliation::Rejected(_) => Acknowledgement::Ack,
        }
    }

    /// Reconcile one raw event payload.
    ///
    /// Never fails: every error is folded into the returned [`Reconciliation`].
    pub async fn reconcile(&self, payload: &[u8]) -> Reconciliation {
        let started = Instant::now();
        let reconciliation = self.process(payload).await;
        ReconcilerMetrics::record(reconciliation.outcome(), started.elapsed());
        reconciliation
    }

    async fn process(&self, payload: &[u8]) -> Reconciliation {
        let event = match ChangeEvent::decode(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed change event");
                return Reconciliation::Malformed(e.to_string());
            },
        };

        let change = match validate(&event, event.mode, self.clock.current_year()) {
            Ok(change) => change,
            Err(violation) => {
                tracing::warn!(
                    mode = ?event.mode,
                    id = ?event.listing_id(),
                    rule = %violation,
                    "Dropping change event that violates a business rule"
                );
                return Reconciliation::Rejected(violation);
            },
        };

        let mode = change.mode();
        match self.apply(change).await {
            Ok(reconciliation) => reconciliation,
            Err(error) => {
                tracing::error!(
                    mode = %mode,
                    id = ?event.listing_id(),
                    error = %error,
                    retry_delay_ms = self.retry_delay.as_millis(),
                    "Failed to apply change event, requesting redelivery"
                );
                Reconciliation::Failed(error)
            },
        }
    }

    async fn apply(&self, change: Change) -> Result<Reconciliation, StoreError> {
        match change {
            Change::Delete { id } => {
                if !self.store.exists_by_id(&id).await? {
                    tracing::info!(id = %id, "DELETE target not found, nothing to do");
                    return Ok(Reconciliation::TargetMissing {
                        mode: ChangeMode::Delete,
                        id,
                    });
                }
                self.store.delete_by_id(&id).await?;
                self.invalidate_caches().await;
                tracing::info!(id = %id, "Listing deleted");
                Ok(Reconciliation::Applied {
                    mode: ChangeMode::Delete,
                    id,
                })
            },

            Change::Create(mut listing) => {
                let stored = match listing.id.as_deref() {
                    Some(id) => self.store.find_by_id(id).await?,
                    None => None,
                };
                // An upsert onto a stored id never moves its creation date.
                if let Some(stored) = stored {
                    tracing::warn!(id = ?listing.id, "CREATE targets a stored listing, overwriting it");
                    listing.date_created = stored.date_created;
                    listing.date_updated = Some(self.clock.today());
                } else {
                    listing.date_created = Some(self.clock.today());
                    listing.date_updated = None;
                }
                let saved = self.store.save(listing).await?;
                self.invalidate_caches().await;
                let id = saved.id.unwrap_or_default();
                tracing::info!(id = %id, make = %saved.make, model = %saved.model, "Listing created");
                Ok(Reconciliation::Applied {
                    mode: ChangeMode::Create,
                    id,
                })
            },

            Change::Update { id, listing } => {
                let Some(existing) = self.store.find_by_id(&id).await? else {
                    tracing::info!(id = %id, "UPDATE target not found, nothing to do");
                    return Ok(Reconciliation::TargetMissing {
                        mode: ChangeMode::Update,
                        id,
                    });
                };
                let merged = merge(existing, listing, self.clock.today());
                self.store.save(merged).await?;
                self.invalidate_caches().await;
                tracing::info!(id = %id, "Listing updated");
                Ok(Reconciliation::Applied {
                    mode: ChangeMode::Update,
                    id,
                })
            },
        }
    }

    async fn invalidate_caches(&self) {
        for namespace in CacheNamespace::ALL {
            self.cache.invalidate_all(namespace).await;
            CacheMetrics::record_invalidation(namespace);
        }
        tracing::debug!("Listing caches evicted");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use listings_testing::{
        InMemoryListingStore, RecordingCache, StoreOp, create_event, delete_event, payload,
        test_clock,
    };

    fn reconciler(store: &InMemoryListingStore, cache: &RecordingCache) -> Reconciler {
        Reconciler::new(
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            Arc::new(test_clock()),
        )
    }

    #[tokio::test]
    async fn acknowledgement_follows_outcome() {
        let reconciler = reconciler(&InMemoryListingStore::new(), &RecordingCache::new())
            .with_retry_delay(Duration::from_millis(7));

        let failed = Reconciliation::Failed(StoreError::Unavailable("down".into()));
        assert_eq!(
            reconciler.acknowledgement(&failed),
            Acknowledgement::Retry(Duration::from_millis(7))
        );
        assert_eq!(
            reconciler.acknowledgement(&Reconciliation::Rejected(Violation::ModeRequired)),
            Acknowledgement::Ack
        );
        assert_eq!(
            reconciler.acknowledgement(&Reconciliation::Malformed("x".into())),
            Acknowledgement::Ack
        );
    }

    #[tokio::test]
    async fn create_stamps_creation_date() {
        let store = InMemoryListingStore::new();
        let cache = RecordingCache::new();
        let result = reconciler(&store, &cache)
            .reconcile(&payload(&create_event()))
            .await;

        let Reconciliation::Applied { mode, id } = result else {
            unreachable!("create should apply");
        };
        assert_eq!(mode, ChangeMode::Create);
        let stored = store.get(&id).unwrap();
        assert_eq!(stored.date_created, Some(test_clock().today()));
        assert_eq!(stored.date_updated, None);
    }

    #[tokio::test]
    async fn missing_delete_target_touches_nothing() {
        let store = InMemoryListingStore::new();
        let cache = RecordingCache::new();
        let result = reconciler(&store, &cache)
            .reconcile(&payload(&delete_event("ghost")))
            .await;

        assert!(matches!(result, Reconciliation::TargetMissing { .. }));
        assert_eq!(store.calls(StoreOp::DeleteById), 0);
        assert_eq!(cache.invalidations(CacheNamespace::AllListings), 0);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(Reconciliation::Malformed(String::new()).outcome(), "malformed");
        assert!(
            Reconciliation::Applied {
                mode: ChangeMode::Delete,
                id: "1".into()
            }
            .changed_state()
        );
    }
}
