//! Seekable media sources
//!
//! A [`SeekableSource`] is a byte-addressable resource with a fixed size, a
//! positionable read cursor and an explicit close. The delivery loop only
//! ever sees `dyn SeekableSource`, so new backends (object storage, remote
//! HTTP) plug in behind [`SourceOpener`] without touching delivery.
//!
//! Backends are selected by [`SourceKind`], a tag read from configuration.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub mod local;
pub mod memory;

pub use local::{LocalFileOpener, LocalFileSource};
pub use memory::{MemoryOpener, MemorySource};

/// Where a media resource lives, as resolved by the song locator
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceLocation {
    /// Absolute path on the local filesystem
    File(PathBuf),

    /// URI for network-backed sources
    Remote(String),
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceLocation::File(path) => write!(f, "{}", path.display()),
            ResourceLocation::Remote(uri) => write!(f, "{}", uri),
        }
    }
}

/// Result of a single read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceChunk {
    /// Bytes read (may be shorter than requested)
    pub data: Bytes,

    /// The cursor is at the end of the resource
    pub eof: bool,
}

/// Errors opening a source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("{backend} backend cannot open {location}")]
    Unsupported {
        backend: SourceKind,
        location: String,
    },

    #[error("I/O error opening {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },
}

/// Open byte-addressable resource
///
/// `size()` is fixed at open time. Reads may return fewer bytes than asked
/// for; callers loop until they have what they need or `eof` is set.
/// `close()` must be idempotent: the session calls it once, and dropping a
/// source without closing it must also release it.
#[async_trait]
pub trait SeekableSource: Send {
    /// Total addressable length in bytes
    fn size(&self) -> u64;

    /// Move the read cursor to an absolute offset
    async fn seek(&mut self, offset: u64) -> io::Result<()>;

    /// Read up to `max_len` bytes from the cursor
    async fn read_chunk(&mut self, max_len: usize) -> io::Result<SourceChunk>;

    /// Release the underlying resource
    fn close(&mut self);
}

/// Factory turning a [`ResourceLocation`] into an open source
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, location: &ResourceLocation)
        -> Result<Box<dyn SeekableSource>, SourceError>;
}

/// Owning handle that closes its source when dropped
///
/// Every exit path of a request (validation failure after open, I/O error,
/// client disconnect, normal completion) releases the source exactly once.
pub struct SourceGuard {
    inner: Box<dyn SeekableSource>,
}

impl SourceGuard {
    pub fn new(inner: Box<dyn SeekableSource>) -> Self {
        Self { inner }
    }

    pub fn as_source_mut(&mut self) -> &mut dyn SeekableSource {
        self.inner.as_mut()
    }

    pub fn size(&self) -> u64 {
        self.inner.size()
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Backend tag used to select a [`SourceOpener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Memory,
}

impl SourceKind {
    /// Build the opener for this backend
    ///
    /// The memory backend starts empty; embedders populate a
    /// [`MemoryOpener`] directly instead.
    pub fn opener(self) -> Arc<dyn SourceOpener> {
        match self {
            SourceKind::Local => Arc::new(LocalFileOpener),
            SourceKind::Memory => Arc::new(MemoryOpener::new()),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Local => write!(f, "local"),
            SourceKind::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(SourceKind::Local),
            "memory" => Ok(SourceKind::Memory),
            other => Err(format!("unknown source backend: {}", other)),
        }
    }
}
