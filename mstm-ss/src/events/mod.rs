//! Playback event publishing
//!
//! # Architecture
//!
//! - [`EventSink`]: publishes one [`PlaybackEvent`] to a messaging backend
//! - [`EventDispatcher`]: hands events to the sink on detached tokio tasks
//!
//! Dispatch is fire-and-forget. The caller (the playback trigger, running
//! inside a delivery task) never waits for the publish, and publish failures
//! and timeouts are logged and dropped. There is no retry and no ordering
//! between events from concurrent sessions.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use mstm_common::events::{PlaybackEvent, SONG_EVENTS_EXCHANGE, SONG_EVENTS_QUEUE};

pub mod amqp;

pub use amqp::AmqpEventSink;

/// Default bound on a single publish
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a publish failed
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("topology declaration failed: {0}")]
    Topology(String),

    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("publish rejected: {0}")]
    Publish(String),
}

/// Messaging backend for playback events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event to the backend
    async fn publish(&self, event: &PlaybackEvent) -> Result<(), PublishError>;

    /// Release backend resources (connections) at process exit
    async fn shutdown(&self) {}

    /// Short backend name reported by `/health`
    fn kind(&self) -> &'static str {
        "custom"
    }
}

/// Sink used when no broker is configured: events are only logged
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: &PlaybackEvent) -> Result<(), PublishError> {
        info!(
            user_id = event.user_id,
            song_id = event.media_id,
            "Playback event (no broker configured)"
        );
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "log"
    }
}

/// Fire-and-forget front end to an [`EventSink`]
///
/// Cheap to clone; every stream session holds one.
#[derive(Clone)]
pub struct EventDispatcher {
    sink: Arc<dyn EventSink>,
    timeout: Duration,
}

impl EventDispatcher {
    pub fn new(sink: Arc<dyn EventSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Publish `event` on an independent task and return immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, event: PlaybackEvent) {
        let sink = Arc::clone(&self.sink);
        let timeout = self.timeout;

        debug!(
            user_id = event.user_id,
            song_id = event.media_id,
            "Dispatching playback event"
        );

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, sink.publish(&event)).await {
                Ok(Ok(())) => {
                    info!(
                        user_id = event.user_id,
                        song_id = event.media_id,
                        "Playback event published"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        user_id = event.user_id,
                        song_id = event.media_id,
                        "Failed to publish playback event: {}",
                        e
                    );
                }
                Err(_) => {
                    warn!(
                        user_id = event.user_id,
                        song_id = event.media_id,
                        "Publishing playback event timed out after {:?}",
                        timeout
                    );
                }
            }
        });
    }

    pub fn sink_kind(&self) -> &'static str {
        self.sink.kind()
    }

    /// Shut down the underlying sink
    pub async fn shutdown(&self) {
        self.sink.shutdown().await;
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{mpsc, Notify};

    struct ChannelEventSink {
        tx: mpsc::UnboundedSender<PlaybackEvent>,
    }

    #[async_trait]
    impl EventSink for ChannelEventSink {
        async fn publish(&self, event: &PlaybackEvent) -> Result<(), PublishError> {
            let _ = self.tx.send(*event);
            Ok(())
        }
    }

    /// Blocks until released, counting attempts
    struct StalledSink {
        attempts: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl EventSink for StalledSink {
        async fn publish(&self, _event: &PlaybackEvent) -> Result<(), PublishError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Err(PublishError::Publish("released".into()))
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = EventDispatcher::new(
            Arc::new(ChannelEventSink { tx }),
            DEFAULT_PUBLISH_TIMEOUT,
        );

        dispatcher.dispatch(PlaybackEvent::new(1, 2));

        let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, PlaybackEvent::new(1, 2));
    }

    #[tokio::test]
    async fn test_dispatch_does_not_wait_for_slow_sink() {
        let sink = Arc::new(StalledSink {
            attempts: AtomicUsize::new(0),
            release: Notify::new(),
        });
        let dispatcher = EventDispatcher::new(sink.clone(), Duration::from_millis(50));

        // Returns even though the publish never completes
        dispatcher.dispatch(PlaybackEvent::new(1, 2));
        dispatcher.dispatch(PlaybackEvent::new(3, 4));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    }
}
