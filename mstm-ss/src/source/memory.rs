//! In-memory backend
//!
//! Serves media held in `Bytes`. Useful for embedding the service with
//! generated content and for exercising the delivery path without a disk.
//! Every source handed out shares a close counter with its opener so callers
//! can verify release.

use super::{ResourceLocation, SeekableSource, SourceChunk, SourceError, SourceOpener};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Source over a shared byte buffer
#[derive(Debug)]
pub struct MemorySource {
    data: Bytes,
    cursor: u64,
    max_read: Option<usize>,
    closed: bool,
    closes: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            cursor: 0,
            max_read: None,
            closed: false,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Cap every read at `max_read` bytes to simulate short reads
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = Some(max_read.max(1));
        self
    }

    /// Counter incremented each time this source is actually released
    pub fn close_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closes)
    }

    fn with_counter(mut self, closes: Arc<AtomicUsize>) -> Self {
        self.closes = closes;
        self
    }
}

#[async_trait]
impl SeekableSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn seek(&mut self, offset: u64) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "source already closed"));
        }
        self.cursor = offset;
        Ok(())
    }

    async fn read_chunk(&mut self, max_len: usize) -> io::Result<SourceChunk> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "source already closed"));
        }

        let len = self.data.len();
        let start = usize::try_from(self.cursor).unwrap_or(usize::MAX).min(len);
        let want = self.max_read.map_or(max_len, |cap| max_len.min(cap));
        let end = start.saturating_add(want).min(len);

        self.cursor = end as u64;
        Ok(SourceChunk {
            data: self.data.slice(start..end),
            eof: start == len && max_len > 0,
        })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Opener serving registered in-memory resources
#[derive(Debug, Default)]
pub struct MemoryOpener {
    resources: RwLock<HashMap<ResourceLocation, Bytes>>,
    max_read: Option<usize>,
    closes: Arc<AtomicUsize>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap reads of every source this opener hands out
    pub fn with_max_read(mut self, max_read: usize) -> Self {
        self.max_read = Some(max_read);
        self
    }

    /// Register (or replace) the bytes served for `location`
    pub fn insert(&self, location: ResourceLocation, data: impl Into<Bytes>) {
        if let Ok(mut resources) = self.resources.write() {
            resources.insert(location, data.into());
        }
    }

    /// Total closes across every source opened so far
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceOpener for MemoryOpener {
    async fn open(
        &self,
        location: &ResourceLocation,
    ) -> Result<Box<dyn SeekableSource>, SourceError> {
        let data = self
            .resources
            .read()
            .ok()
            .and_then(|resources| resources.get(location).cloned())
            .ok_or_else(|| SourceError::NotFound(location.to_string()))?;

        let mut source = MemorySource::new(data).with_counter(Arc::clone(&self.closes));
        if let Some(max_read) = self.max_read {
            source = source.with_max_read(max_read);
        }
        Ok(Box::new(source))
    }
}
