//! Event-driven invalidation.
//!
//! Change notifications from the system of record arrive on a bounded queue
//! and are applied by a single worker:
//!
//! ```text
//! Received -> KeysResolved -> Evicted -> Acknowledged
//! ```
//!
//! A message that fails validation is acknowledged as skipped. Eviction is
//! idempotent, so a redelivered event is harmless.

mod redis;

use tenant_cache_core::{InvalidationEvent, InvalidationMessage};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::metrics;
use crate::store::CacheClient;

pub use self::redis::{DEFAULT_CHANNEL, RedisEventSource, publish_invalidation};

/// Processing stage of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Received,
    KeysResolved,
    Evicted,
    Acknowledged,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationOutcome {
    Evicted { keys_removed: u64 },
    Skipped { reason: String },
}

impl InvalidationOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Evicted { .. } => "evicted",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Totals reported by the worker when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerSummary {
    pub processed: u64,
    pub evicted: u64,
    pub skipped: u64,
}

/// The listener's queue has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalidation listener is closed")]
pub struct ListenerClosed;

struct Delivery {
    message: InvalidationMessage,
    ack: Option<oneshot::Sender<InvalidationOutcome>>,
}

/// Producer side of the listener queue. Cheap to clone.
///
/// `send` waits while the queue is full, which pushes back on the event
/// source instead of dropping events.
#[derive(Clone, Debug)]
pub struct InvalidationSender {
    tx: mpsc::Sender<Delivery>,
}

impl InvalidationSender {
    pub async fn send(&self, message: InvalidationMessage) -> Result<(), ListenerClosed> {
        self.tx
            .send(Delivery { message, ack: None })
            .await
            .map_err(|_| ListenerClosed)
    }

    pub async fn send_event(&self, event: &InvalidationEvent) -> Result<(), ListenerClosed> {
        self.send(event.to_message()).await
    }

    /// Enqueue and wait until the event has been applied.
    pub async fn send_with_ack(
        &self,
        message: InvalidationMessage,
    ) -> Result<InvalidationOutcome, ListenerClosed> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Delivery {
                message,
                ack: Some(ack),
            })
            .await
            .map_err(|_| ListenerClosed)?;
        done.await.map_err(|_| ListenerClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Applies invalidation events to the cache.
#[derive(Debug, Clone)]
pub struct InvalidationListener {
    client: CacheClient,
    capacity: usize,
}

impl InvalidationListener {
    pub fn new(client: CacheClient, capacity: usize) -> Self {
        Self {
            client,
            capacity: capacity.max(1),
        }
    }

    /// Evict everything `event` invalidates.
    ///
    /// Only validated events reach this point, so keys always resolve; an
    /// unresolvable event is still reported as skipped.
    pub async fn apply(&self, event: &InvalidationEvent) -> InvalidationOutcome {
        let plan = match event.resolve() {
            Ok(plan) => plan,
            Err(e) => {
                return InvalidationOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };
        trace!(state = ?EventState::KeysResolved, tenant = %event.tenant, namespace = %event.namespace, "invalidation keys resolved");

        let mut keys_removed = 0;
        if let Some(key) = &plan.entity_key {
            if self.client.delete(key, "event").await {
                keys_removed += 1;
            }
        }
        keys_removed += self
            .client
            .delete_by_pattern(&plan.collection_pattern, "event")
            .await;
        trace!(state = ?EventState::Evicted, keys_removed, "invalidation applied");

        InvalidationOutcome::Evicted { keys_removed }
    }

    /// Validate a raw message and apply it.
    pub async fn process(&self, message: InvalidationMessage) -> InvalidationOutcome {
        trace!(state = ?EventState::Received, tenant = %message.tenant, namespace = %message.namespace, "invalidation received");
        let outcome = match InvalidationEvent::try_from(message) {
            Ok(event) => {
                let outcome = self.apply(&event).await;
                debug!(
                    tenant = %event.tenant,
                    namespace = %event.namespace,
                    kind = %event.kind,
                    entity_id = event.entity_id.as_deref().unwrap_or(""),
                    ?outcome,
                    "invalidation event processed"
                );
                outcome
            }
            Err(e) => {
                warn!(error = %e, "malformed invalidation event, skipping");
                InvalidationOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        };
        metrics::record_invalidation_event(outcome.label());
        outcome
    }

    /// Spawn the worker.
    ///
    /// On cancellation the queue is closed and every event already buffered
    /// is applied before the worker returns its summary.
    pub fn start(self, shutdown: CancellationToken) -> (InvalidationSender, JoinHandle<ListenerSummary>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let handle = tokio::spawn(self.run(rx, shutdown));
        (InvalidationSender { tx }, handle)
    }

    async fn run(self, mut rx: mpsc::Receiver<Delivery>, shutdown: CancellationToken) -> ListenerSummary {
        let mut summary = ListenerSummary::default();
        info!(capacity = self.capacity, backend = self.client.backend_name(), "invalidation listener started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                delivery = rx.recv() => match delivery {
                    Some(delivery) => self.handle(delivery, &mut summary).await,
                    None => break,
                },
            }
        }

        rx.close();
        while let Some(delivery) = rx.recv().await {
            self.handle(delivery, &mut summary).await;
        }
        info!(
            processed = summary.processed,
            evicted = summary.evicted,
            skipped = summary.skipped,
            "invalidation listener stopped"
        );
        summary
    }

    async fn handle(&self, delivery: Delivery, summary: &mut ListenerSummary) {
        let outcome = self.process(delivery.message).await;
        summary.processed += 1;
        match outcome {
            InvalidationOutcome::Evicted { .. } => summary.evicted += 1,
            InvalidationOutcome::Skipped { .. } => summary.skipped += 1,
        }
        if let Some(ack) = delivery.ack {
            // The sender may have stopped waiting.
            let _ = ack.send(outcome);
        }
        trace!(state = ?EventState::Acknowledged, "invalidation acknowledged");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalBackend;
    use std::sync::Arc;
    use std::time::Duration;
    use tenant_cache_core::{CacheKey, ChangeKind, CollectionQuery, Namespace, TenantId};

    const TTL: Duration = Duration::from_secs(60);

    fn client() -> CacheClient {
        CacheClient::new(Arc::new(LocalBackend::default()), Duration::from_millis(100))
    }

    fn message(tenant: &str, namespace: &str, id: Option<&str>, kind: ChangeKind) -> InvalidationMessage {
        InvalidationMessage {
            tenant: tenant.into(),
            namespace: namespace.into(),
            entity_id: id.map(Into::into),
            kind,
            occurred_at: None,
        }
    }

    #[tokio::test]
    async fn test_updated_event_evicts_entity_and_collections() {
        let client = client();
        let acme = TenantId::new("acme").unwrap();
        let users = Namespace::parse("users").unwrap();
        let entity = CacheKey::for_entity(&acme, &users, "U1").unwrap();
        let collection = CacheKey::for_collection(&acme, &users, &CollectionQuery::new().with("status", "ACTIVE"));
        client.set(&entity, vec![1], TTL).await;
        client.set(&collection, vec![2], TTL).await;

        let listener = InvalidationListener::new(client.clone(), 8);
        let outcome = listener
            .process(message("acme", "users", Some("U1"), ChangeKind::Updated))
            .await;

        assert!(matches!(outcome, InvalidationOutcome::Evicted { keys_removed } if keys_removed >= 2));
        assert!(!client.exists(&entity).await);
        assert!(!client.exists(&collection).await);
    }

    #[tokio::test]
    async fn test_malformed_event_is_skipped() {
        let listener = InvalidationListener::new(client(), 8);
        let outcome = listener
            .process(message("acme corp", "users", Some("U1"), ChangeKind::Deleted))
            .await;
        assert!(matches!(outcome, InvalidationOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_worker_drains_queue_on_shutdown() {
        let listener = InvalidationListener::new(client(), 16);
        let shutdown = CancellationToken::new();
        let (sender, handle) = listener.start(shutdown.clone());

        for i in 0..5 {
            sender
                .send(message("acme", "users", Some(&format!("U{i}")), ChangeKind::Updated))
                .await
                .unwrap();
        }
        sender
            .send(message("", "users", None, ChangeKind::Updated))
            .await
            .unwrap();
        shutdown.cancel();

        let summary = handle.await.unwrap();
        assert_eq!(summary.processed, 6);
        assert_eq!(summary.evicted, 5);
        assert_eq!(summary.skipped, 1);
        assert!(sender.send(message("acme", "users", None, ChangeKind::Updated)).await.is_err());
    }

    #[tokio::test]
    async fn test_send_with_ack_reports_outcome() {
        let listener = InvalidationListener::new(client(), 4);
        let shutdown = CancellationToken::new();
        let (sender, handle) = listener.start(shutdown.clone());

        let outcome = sender
            .send_with_ack(message("acme", "orders", None, ChangeKind::Updated))
            .await
            .unwrap();
        assert_eq!(outcome, InvalidationOutcome::Evicted { keys_removed: 0 });

        shutdown.cancel();
        handle.await.unwrap();
    }
}
