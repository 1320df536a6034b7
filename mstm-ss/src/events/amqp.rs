//! AMQP 0-9-1 event sink (RabbitMQ)
//!
//! Publishes playback events as JSON to a durable fanout exchange.
//!
//! # Connection lifecycle
//!
//! - **Init:** `AmqpEventSink::new` only records the broker URL; nothing
//!   connects at startup.
//! - **Lazy connect:** the first publish opens the connection; later
//!   publishes reuse it and reconnect once it is no longer connected.
//! - **Per publish:** a fresh channel, idempotent declaration of exchange,
//!   queue and binding, then the publish itself.
//! - **Teardown:** [`EventSink::shutdown`] closes the connection; called by
//!   `main` after the HTTP server stops.
//!
//! The connection slot is behind an async `RwLock` that is only ever taken
//! inside publish tasks, never on the streaming path.

use super::{EventSink, PlaybackEvent, PublishError};
use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Broker sink with a lazily established, shared connection
pub struct AmqpEventSink {
    url: String,
    exchange: String,
    queue: String,
    connection: RwLock<Option<Arc<Connection>>>,
}

impl AmqpEventSink {
    pub fn new(url: impl Into<String>, exchange: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: exchange.into(),
            queue: queue.into(),
            connection: RwLock::new(None),
        }
    }

    /// Current connection, establishing a new one if needed
    async fn connection(&self) -> Result<Arc<Connection>, PublishError> {
        // Fast path: shared read access to a live connection
        if let Some(conn) = self.connection.read().await.as_ref() {
            if conn.status().connected() {
                return Ok(Arc::clone(conn));
            }
        }

        let mut slot = self.connection.write().await;

        // Another publish may have reconnected while we waited
        if let Some(conn) = slot.as_ref() {
            if conn.status().connected() {
                return Ok(Arc::clone(conn));
            }
            warn!("AMQP connection lost, reconnecting");
        }

        let conn = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|e| PublishError::Connection(e.to_string()))?;
        info!("Connected to AMQP broker");

        let conn = Arc::new(conn);
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// Declare exchange, queue and binding; all three are idempotent
    async fn declare_topology(&self, channel: &Channel) -> Result<(), PublishError> {
        channel
            .exchange_declare(
                &self.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| PublishError::Topology(format!("exchange {}: {}", self.exchange, e)))?;

        let queue = channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| PublishError::Topology(format!("queue {}: {}", self.queue, e)))?;

        channel
            .queue_bind(
                queue.name().as_str(),
                &self.exchange,
                "",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| PublishError::Topology(format!("binding: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl EventSink for AmqpEventSink {
    async fn publish(&self, event: &PlaybackEvent) -> Result<(), PublishError> {
        let body = event.to_json_bytes()?;

        let conn = self.connection().await?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| PublishError::Connection(format!("channel: {}", e)))?;

        self.declare_topology(&channel).await?;

        let result = channel
            .basic_publish(
                &self.exchange,
                "",
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| PublishError::Publish(e.to_string()));

        let result = match result {
            Ok(confirm) => confirm
                .await
                .map(|_| ())
                .map_err(|e| PublishError::Publish(e.to_string())),
            Err(e) => Err(e),
        };

        if let Err(e) = channel.close(200, "done").await {
            debug!("Error closing AMQP channel: {}", e);
        }

        result
    }

    fn kind(&self) -> &'static str {
        "amqp"
    }

    async fn shutdown(&self) {
        if let Some(conn) = self.connection.write().await.take() {
            match conn.close(200, "shutdown").await {
                Ok(()) => info!("AMQP connection closed"),
                Err(e) => warn!("Error closing AMQP connection: {}", e),
            }
        }
    }
}

impl std::fmt::Debug for AmqpEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // URL may embed credentials
        f.debug_struct("AmqpEventSink")
            .field("exchange", &self.exchange)
            .field("queue", &self.queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unreachable_broker_is_connection_error() {
        // Port 1 on loopback refuses connections immediately
        let sink = AmqpEventSink::new("amqp://127.0.0.1:1/%2f", "song_events", "song_events_queue");

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            sink.publish(&PlaybackEvent::new(1, 2)),
        )
        .await
        .expect("connect attempt should fail fast");

        assert!(matches!(result, Err(PublishError::Connection(_))));
    }

    #[tokio::test]
    async fn test_shutdown_without_connection_is_noop() {
        let sink = AmqpEventSink::new("amqp://127.0.0.1:1/%2f", "song_events", "song_events_queue");
        sink.shutdown().await;
    }
}
