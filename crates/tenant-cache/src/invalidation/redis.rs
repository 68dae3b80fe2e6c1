//! Redis pub/sub transport for invalidation events.

use std::time::Duration;

use ::redis::{AsyncCommands, Client};
use deadpool_redis::Pool;
use futures_util::StreamExt;
use tenant_cache_core::{InvalidationEvent, InvalidationMessage};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::InvalidationSender;
use crate::error::EventSourceError;
use crate::metrics;

/// Channel used when none is configured.
pub const DEFAULT_CHANNEL: &str = "tenant-cache:invalidate";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Reconnect delay: doubles per failed attempt, back to the start once a
/// subscription is established.
#[derive(Debug)]
struct Backoff {
    current: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        delay
    }

    fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

/// Subscribes to the invalidation channel and feeds the listener queue.
///
/// Payloads are JSON [`InvalidationMessage`]s. Undecodable payloads are
/// logged and dropped here; semantic validation happens in the listener.
pub struct RedisEventSource {
    redis_url: String,
    channel: String,
    sender: InvalidationSender,
}

impl RedisEventSource {
    pub fn new(redis_url: impl Into<String>, channel: impl Into<String>, sender: InvalidationSender) -> Self {
        Self {
            redis_url: redis_url.into(),
            channel: channel.into(),
            sender,
        }
    }

    /// Spawn the subscription loop. Reconnects with exponential backoff until
    /// `shutdown` fires or the listener queue closes.
    pub fn start(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = Backoff::new();
            loop {
                match self.run(&shutdown, &mut backoff).await {
                    Ok(()) => break,
                    Err(e) => {
                        if shutdown.is_cancelled() {
                            break;
                        }
                        let delay = backoff.next_delay();
                        tracing::error!(
                            error = %e,
                            channel = %self.channel,
                            backoff_secs = delay.as_secs(),
                            "Invalidation subscription error, reconnecting..."
                        );
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
            tracing::info!(channel = %self.channel, "invalidation event source stopped");
        })
    }

    /// Returns `Ok` on a clean stop, `Err` when the connection must be retried.
    async fn run(&self, shutdown: &CancellationToken, backoff: &mut Backoff) -> Result<(), EventSourceError> {
        let client = Client::open(self.redis_url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        backoff.reset();
        tracing::info!(channel = %self.channel, "Subscribed to invalidation channel");

        let mut stream = pubsub.on_message();
        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                msg = stream.next() => msg,
            };
            let Some(msg) = msg else {
                return Err(EventSourceError::StreamClosed);
            };
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "non-text invalidation payload, skipping");
                    metrics::record_invalidation_event("skipped");
                    continue;
                }
            };
            let message: InvalidationMessage = match serde_json::from_str(&payload) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, payload = %payload, "undecodable invalidation payload, skipping");
                    metrics::record_invalidation_event("skipped");
                    continue;
                }
            };
            if self.sender.send(message).await.is_err() {
                tracing::debug!("invalidation listener closed, leaving channel");
                return Ok(());
            }
        }
    }
}

/// Publish an invalidation event for every node subscribed to `channel`.
pub async fn publish_invalidation(
    pool: &Pool,
    channel: &str,
    event: &InvalidationEvent,
) -> Result<(), EventSourceError> {
    let payload = event.to_message().encode()?;
    let mut conn = pool.get().await?;
    conn.publish::<_, _, ()>(channel, &payload).await?;
    tracing::debug!(
        channel,
        tenant = %event.tenant,
        namespace = %event.namespace,
        kind = %event.kind,
        "published invalidation event"
    );
    Ok(())
}
