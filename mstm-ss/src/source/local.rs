//! Local filesystem backend

use super::{ResourceLocation, SeekableSource, SourceChunk, SourceError, SourceKind, SourceOpener};
use async_trait::async_trait;
use bytes::BytesMut;
use std::io::{self, SeekFrom};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Opens [`ResourceLocation::File`] paths
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileOpener;

#[async_trait]
impl SourceOpener for LocalFileOpener {
    async fn open(
        &self,
        location: &ResourceLocation,
    ) -> Result<Box<dyn SeekableSource>, SourceError> {
        match location {
            ResourceLocation::File(path) => Ok(Box::new(LocalFileSource::open(path).await?)),
            ResourceLocation::Remote(uri) => Err(SourceError::Unsupported {
                backend: SourceKind::Local,
                location: uri.clone(),
            }),
        }
    }
}

/// Regular file read through tokio's blocking-pool file API
pub struct LocalFileSource {
    file: Option<File>,
    size: u64,
}

impl LocalFileSource {
    /// Open a regular file and record its size
    ///
    /// Missing files, directories and permission failures all map to
    /// [`SourceError::NotFound`]: the caller only needs to know the media
    /// cannot be served.
    pub async fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).await.map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                SourceError::NotFound(path.display().to_string())
            }
            _ => SourceError::Io {
                location: path.display().to_string(),
                source: e,
            },
        })?;

        let metadata = file.metadata().await.map_err(|e| SourceError::Io {
            location: path.display().to_string(),
            source: e,
        })?;

        if !metadata.is_file() {
            return Err(SourceError::NotFound(path.display().to_string()));
        }

        debug!("Opened {} ({} bytes)", path.display(), metadata.len());

        Ok(Self {
            file: Some(file),
            size: metadata.len(),
        })
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "source already closed"))
    }
}

#[async_trait]
impl SeekableSource for LocalFileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.file_mut()?.seek(SeekFrom::Start(offset)).await?;
        Ok(())
    }

    async fn read_chunk(&mut self, max_len: usize) -> io::Result<SourceChunk> {
        let file = self.file_mut()?;
        let mut buf = BytesMut::zeroed(max_len);
        let n = file.read(&mut buf).await?;
        buf.truncate(n);

        Ok(SourceChunk {
            data: buf.freeze(),
            eof: n == 0 && max_len > 0,
        })
    }

    fn close(&mut self) {
        // Dropping the handle closes the descriptor
        self.file.take();
    }
}
