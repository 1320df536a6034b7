//! Stream session
//!
//! Request-scoped state for one streaming response: the open source, the
//! resolved range, and the playback trigger. A session is consumed by
//! [`StreamSession::stream_to_body`], which runs on its own task; the source
//! is released when the session is dropped, whatever the outcome.

use crate::delivery::{deliver, ChannelSink, ChunkSink, DeliveryError};
use crate::range::RangeResolution;
use crate::source::SourceGuard;
use crate::trigger::PlaybackTrigger;
use std::io;
use tracing::{debug, warn};

pub struct StreamSession {
    media_id: u64,
    source: SourceGuard,
    resolution: RangeResolution,
    trigger: PlaybackTrigger,
    chunk_size: usize,
}

impl StreamSession {
    pub fn new(
        media_id: u64,
        source: SourceGuard,
        resolution: RangeResolution,
        trigger: PlaybackTrigger,
        chunk_size: usize,
    ) -> Self {
        Self {
            media_id,
            source,
            resolution,
            trigger,
            chunk_size,
        }
    }

    /// Deliver the resolved range into `sink`, driving the trigger
    ///
    /// Completion is reported to the trigger only when every byte of the
    /// range was written.
    pub async fn run<S: ChunkSink + ?Sized>(mut self, sink: &mut S) -> Result<u64, DeliveryError> {
        let sent = match self.resolution.delivery_range() {
            Some(range) => {
                let trigger = &mut self.trigger;
                deliver(
                    self.source.as_source_mut(),
                    range,
                    sink,
                    self.chunk_size,
                    |sent| trigger.on_bytes_sent(sent),
                )
                .await?
            }
            // Empty resource: nothing to copy
            None => 0,
        };

        self.trigger.on_delivery_complete();
        Ok(sent)
    }

    /// Run the session into an HTTP body channel, logging the outcome
    ///
    /// Errors never propagate past this point: the response status is
    /// already on the wire.
    pub async fn stream_to_body(self, mut sink: ChannelSink) {
        let media_id = self.media_id;

        match self.run(&mut sink).await {
            Ok(sent) => {
                debug!(song_id = media_id, sent, "Stream complete");
            }
            Err(DeliveryError::Disconnected { sent }) => {
                debug!(song_id = media_id, sent, "Client disconnected mid-stream");
            }
            Err(e) => {
                warn!(song_id = media_id, "Stream aborted: {}", e);
                sink.fail(io::Error::new(io::ErrorKind::Other, e.to_string()))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{body_channel, SinkError};
    use crate::events::{EventDispatcher, EventSink, PlaybackEvent, PublishError};
    use crate::range::resolve;
    use crate::source::MemorySource;
    use crate::trigger::{TriggerPolicy, DEFAULT_PLAY_THRESHOLD};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio_stream::StreamExt;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<PlaybackEvent>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn publish(&self, event: &PlaybackEvent) -> Result<(), PublishError> {
            self.events.lock().unwrap().push(*event);
            Ok(())
        }
    }

    /// Sink that hangs up after `limit` writes
    struct HangUpSink {
        written: usize,
        limit: usize,
    }

    #[async_trait]
    impl ChunkSink for HangUpSink {
        async fn write_chunk(&mut self, _chunk: Bytes) -> Result<(), SinkError> {
            if self.written == self.limit {
                return Err(SinkError::Disconnected);
            }
            self.written += 1;
            Ok(())
        }
    }

    fn recording_dispatcher() -> (EventDispatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (EventDispatcher::new(sink.clone(), Duration::from_secs(1)), sink)
    }

    #[tokio::test]
    async fn test_full_extent_fires_after_last_chunk() {
        let (dispatcher, events) = recording_dispatcher();
        let source = MemorySource::new(vec![0u8; 1000]);
        let closes = source.close_counter();

        let resolution = resolve(None, 1000).unwrap();
        let trigger = PlaybackTrigger::for_full_extent(
            TriggerPolicy::Asymmetric,
            1000,
            DEFAULT_PLAY_THRESHOLD,
            Some(4),
            77,
            dispatcher,
        );
        let session = StreamSession::new(
            77,
            SourceGuard::new(Box::new(source)),
            resolution,
            trigger,
            100,
        );

        let (sink, mut body) = body_channel();
        let task = tokio::spawn(session.stream_to_body(sink));

        let mut received = 0;
        while let Some(chunk) = body.next().await {
            received += chunk.unwrap().len();
        }
        task.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(received, 1000);
        assert_eq!(*events.events.lock().unwrap(), vec![PlaybackEvent::new(4, 77)]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_closes_source_once_and_skips_completion() {
        let (dispatcher, events) = recording_dispatcher();
        let source = MemorySource::new(vec![0u8; 1000]);
        let closes = source.close_counter();

        let trigger = PlaybackTrigger::for_full_extent(
            TriggerPolicy::Asymmetric,
            1000,
            DEFAULT_PLAY_THRESHOLD,
            Some(4),
            77,
            dispatcher,
        );
        let session = StreamSession::new(
            77,
            SourceGuard::new(Box::new(source)),
            resolve(None, 1000).unwrap(),
            trigger,
            100,
        );

        let mut sink = HangUpSink { written: 0, limit: 5 };
        let err = session.run(&mut sink).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(err, DeliveryError::Disconnected { sent: 500 }));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(events.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ranged_session_fires_mid_stream() {
        let (dispatcher, events) = recording_dispatcher();
        let source = MemorySource::new(vec![0u8; 1000]);

        let resolution = resolve(Some("bytes=0-999"), 1000).unwrap();
        let trigger =
            PlaybackTrigger::for_range(0, 1000, DEFAULT_PLAY_THRESHOLD, Some(2), 9, dispatcher);
        let session = StreamSession::new(
            9,
            SourceGuard::new(Box::new(source)),
            resolution,
            trigger,
            100,
        );

        // Hang up at 40%: the event has already been dispatched
        let mut sink = HangUpSink { written: 0, limit: 4 };
        assert!(session.run(&mut sink).await.is_err());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(*events.events.lock().unwrap(), vec![PlaybackEvent::new(2, 9)]);
    }

    #[tokio::test]
    async fn test_empty_resource_completes_immediately() {
        let (dispatcher, _events) = recording_dispatcher();
        let trigger = PlaybackTrigger::for_full_extent(
            TriggerPolicy::Asymmetric,
            0,
            DEFAULT_PLAY_THRESHOLD,
            None,
            1,
            dispatcher,
        );
        let session = StreamSession::new(
            1,
            SourceGuard::new(Box::new(MemorySource::new(Vec::new()))),
            resolve(None, 0).unwrap(),
            trigger,
            100,
        );

        let mut sink = HangUpSink { written: 0, limit: 0 };
        assert_eq!(session.run(&mut sink).await.unwrap(), 0);
    }
}
