//! Song location
//!
//! Maps a media id to the [`ResourceLocation`] of its audio. The catalogue
//! lives in the content service's PostgreSQL database; this service only
//! reads the `audio_url` column, which stores a path relative to the content
//! base directory.

use crate::source::ResourceLocation;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Lookup failures
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("song {0} not found")]
    NotFound(u64),

    #[error("song {id} has an unusable audio path {path:?}")]
    InvalidPath { id: u64, path: String },

    #[error("catalogue lookup failed: {0}")]
    Backend(String),
}

/// Resolves media ids to resource locations
#[async_trait]
pub trait SongLocator: Send + Sync {
    async fn locate(&self, media_id: u64) -> Result<ResourceLocation, LocateError>;
}

/// Join a stored relative path onto `base`
///
/// Stored paths must stay inside the base directory: absolute paths and
/// parent-directory components are refused.
pub fn join_content_path(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative.trim());
    if relative.as_os_str().is_empty() {
        return None;
    }

    let mut joined = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(joined)
}

// ============================================================================
// PostgreSQL catalogue
// ============================================================================

/// Locator backed by the `music_streaming.songs` table
#[derive(Debug, Clone)]
pub struct PgSongLocator {
    pool: PgPool,
    content_base: PathBuf,
}

impl PgSongLocator {
    /// Maximum pooled connections to the catalogue
    pub const MAX_CONNECTIONS: u32 = 10;

    /// Create a locator whose pool connects on first use
    pub fn connect_lazy(database_url: &str, content_base: PathBuf) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(Self::MAX_CONNECTIONS)
            .connect_lazy(database_url)?;

        Ok(Self { pool, content_base })
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SongLocator for PgSongLocator {
    async fn locate(&self, media_id: u64) -> Result<ResourceLocation, LocateError> {
        let id = i64::try_from(media_id).map_err(|_| LocateError::NotFound(media_id))?;

        let audio_url: Option<String> =
            sqlx::query_scalar::<_, String>("SELECT audio_url FROM music_streaming.songs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    warn!("Song lookup for {} failed: {}", media_id, e);
                    LocateError::Backend(e.to_string())
                })?;

        let audio_url = audio_url.ok_or(LocateError::NotFound(media_id))?;

        join_content_path(&self.content_base, &audio_url)
            .map(ResourceLocation::File)
            .ok_or(LocateError::InvalidPath {
                id: media_id,
                path: audio_url,
            })
    }
}

// ============================================================================
// In-memory catalogue
// ============================================================================

/// Fixed id → location map
#[derive(Debug, Clone, Default)]
pub struct MemorySongLocator {
    songs: HashMap<u64, ResourceLocation>,
}

impl MemorySongLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_song(mut self, media_id: u64, location: ResourceLocation) -> Self {
        self.songs.insert(media_id, location);
        self
    }
}

#[async_trait]
impl SongLocator for MemorySongLocator {
    async fn locate(&self, media_id: u64) -> Result<ResourceLocation, LocateError> {
        self.songs
            .get(&media_id)
            .cloned()
            .ok_or(LocateError::NotFound(media_id))
    }
}
