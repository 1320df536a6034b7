//! Chunked delivery loop
//!
//! Copies a [`ByteRange`] from a [`SeekableSource`] into a [`ChunkSink`] one
//! chunk at a time. After every successful write the caller's
//! `on_bytes_sent` callback sees the cumulative byte count; this is how the
//! playback trigger observes progress.
//!
//! The loop never retries a failed write and never resends a chunk. Resuming
//! an interrupted transfer is the client's job (a fresh `Range` request).

use crate::range::ByteRange;
use crate::source::SeekableSource;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Default chunk size: 32 KiB
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Item type carried by the response body channel
pub type BodyItem = Result<Bytes, io::Error>;

/// Why a sink refused a chunk
#[derive(Debug, Error)]
pub enum SinkError {
    /// The peer went away; nothing to report to anyone
    #[error("peer disconnected")]
    Disconnected,

    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// Destination for delivered chunks
#[async_trait]
pub trait ChunkSink: Send {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SinkError>;
}

/// Sink feeding an HTTP response body through a bounded channel
///
/// With a capacity of one the producer is never more than one chunk ahead of
/// the connection writing to the client.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<BodyItem>,
}

impl ChannelSink {
    /// Terminate the body with an error so the connection is cut instead of
    /// ending cleanly short of `Content-Length`
    pub async fn fail(&self, err: io::Error) {
        // Receiver may already be gone
        let _ = self.tx.send(Err(err)).await;
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| SinkError::Disconnected)
    }
}

/// Create a sink and the stream to hand to `axum::body::Body::from_stream`
pub fn body_channel() -> (ChannelSink, ReceiverStream<BodyItem>) {
    let (tx, rx) = mpsc::channel(1);
    (ChannelSink { tx }, ReceiverStream::new(rx))
}

/// Delivery stopped before the whole range was written
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("client disconnected after {sent} bytes")]
    Disconnected { sent: u64 },

    #[error("read failed after {sent} bytes: {source}")]
    Read {
        sent: u64,
        #[source]
        source: io::Error,
    },

    #[error("write failed after {sent} bytes: {source}")]
    Write {
        sent: u64,
        #[source]
        source: io::Error,
    },

    #[error("source ended after {sent} of {expected} bytes")]
    Truncated { sent: u64, expected: u64 },
}

impl DeliveryError {
    /// Bytes successfully written before the abort
    pub fn bytes_sent(&self) -> u64 {
        match self {
            DeliveryError::Disconnected { sent }
            | DeliveryError::Read { sent, .. }
            | DeliveryError::Write { sent, .. }
            | DeliveryError::Truncated { sent, .. } => *sent,
        }
    }
}

/// Deliver `range` from `source` into `sink`
///
/// Returns the number of bytes written, which equals `range.len()` on
/// success. `on_bytes_sent` runs exactly once per written chunk, before the
/// next read, with a strictly increasing total.
pub async fn deliver<S, F>(
    source: &mut dyn SeekableSource,
    range: ByteRange,
    sink: &mut S,
    chunk_size: usize,
    mut on_bytes_sent: F,
) -> Result<u64, DeliveryError>
where
    S: ChunkSink + ?Sized,
    F: FnMut(u64),
{
    let expected = range.len();
    let chunk_size = chunk_size.max(1) as u64;
    let mut sent = 0u64;

    source
        .seek(range.start)
        .await
        .map_err(|source| DeliveryError::Read { sent, source })?;

    while sent < expected {
        let want = (expected - sent).min(chunk_size) as usize;

        let chunk = fill_chunk(source, want)
            .await
            .map_err(|source| DeliveryError::Read { sent, source })?;

        if chunk.is_empty() {
            return Err(DeliveryError::Truncated { sent, expected });
        }

        let len = chunk.len() as u64;
        sink.write_chunk(chunk).await.map_err(|e| match e {
            SinkError::Disconnected => DeliveryError::Disconnected { sent },
            SinkError::Io(source) => DeliveryError::Write { sent, source },
        })?;

        sent += len;
        on_bytes_sent(sent);
    }

    Ok(sent)
}

/// Read until `want` bytes are buffered or the source reports EOF
///
/// An empty read is treated as end of data, so a source that stalls cannot
/// spin this loop.
async fn fill_chunk(source: &mut dyn SeekableSource, want: usize) -> io::Result<Bytes> {
    let first = source.read_chunk(want).await?;
    if first.eof || first.data.is_empty() || first.data.len() >= want {
        return Ok(first.data);
    }

    let mut buf = BytesMut::with_capacity(want);
    buf.extend_from_slice(&first.data);

    while buf.len() < want {
        let next = source.read_chunk(want - buf.len()).await?;
        if next.data.is_empty() {
            break;
        }
        buf.extend_from_slice(&next.data);
        if next.eof {
            break;
        }
    }

    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    /// Sink collecting chunks, optionally hanging up after `fail_after` writes
    #[derive(Default)]
    struct VecSink {
        chunks: Vec<Bytes>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl ChunkSink for VecSink {
        async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), SinkError> {
            if self.fail_after == Some(self.chunks.len()) {
                return Err(SinkError::Disconnected);
            }
            self.chunks.push(chunk);
            Ok(())
        }
    }

    impl VecSink {
        fn body(&self) -> Vec<u8> {
            self.chunks.iter().flat_map(|c| c.iter().copied()).collect()
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_delivers_range_in_chunks() {
        let data = pattern(1000);
        let mut source = MemorySource::new(data.clone());
        let mut sink = VecSink::default();
        let mut progress = Vec::new();

        let sent = deliver(
            &mut source,
            ByteRange { start: 100, end: 349 },
            &mut sink,
            100,
            |total| progress.push(total),
        )
        .await
        .unwrap();

        assert_eq!(sent, 250);
        assert_eq!(progress, vec![100, 200, 250]);
        assert_eq!(sink.chunks.len(), 3);
        assert_eq!(sink.body(), &data[100..350]);
    }

    #[tokio::test]
    async fn test_short_reads_are_refilled() {
        let data = pattern(500);
        let mut source = MemorySource::new(data.clone()).with_max_read(33);
        let mut sink = VecSink::default();
        let mut progress = Vec::new();

        deliver(&mut source, ByteRange::full(500), &mut sink, 128, |t| progress.push(t))
            .await
            .unwrap();

        // Callbacks follow chunk boundaries, not read boundaries
        assert_eq!(progress, vec![128, 256, 384, 500]);
        assert_eq!(sink.body(), data);
    }

    #[tokio::test]
    async fn test_disconnect_aborts_without_further_reads() {
        let mut source = MemorySource::new(pattern(1000));
        let mut sink = VecSink {
            fail_after: Some(2),
            ..Default::default()
        };
        let mut callbacks = 0;

        let err = deliver(&mut source, ByteRange::full(1000), &mut sink, 100, |_| callbacks += 1)
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Disconnected { sent: 200 }));
        assert_eq!(err.bytes_sent(), 200);
        assert_eq!(callbacks, 2);
    }

    #[tokio::test]
    async fn test_truncated_source_reports_shortfall() {
        // Range claims more bytes than the source holds
        let mut source = MemorySource::new(pattern(150));
        let mut sink = VecSink::default();

        let err = deliver(&mut source, ByteRange { start: 0, end: 299 }, &mut sink, 100, |_| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::Truncated {
                sent: 150,
                expected: 300
            }
        ));
    }

    #[tokio::test]
    async fn test_same_range_twice_is_byte_identical() {
        let data = pattern(4096);
        let range = ByteRange { start: 1000, end: 2999 };
        let mut bodies = Vec::new();

        for _ in 0..2 {
            let mut source = MemorySource::new(data.clone());
            let mut sink = VecSink::default();
            deliver(&mut source, range, &mut sink, 512, |_| {}).await.unwrap();
            bodies.push(sink.body());
        }

        assert_eq!(bodies[0], bodies[1]);
        assert_eq!(bodies[0], &data[1000..3000]);
    }

    #[tokio::test]
    async fn test_channel_sink_reports_dropped_receiver() {
        let (mut sink, stream) = body_channel();
        drop(stream);

        let result = sink.write_chunk(Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(SinkError::Disconnected)));
    }
}
