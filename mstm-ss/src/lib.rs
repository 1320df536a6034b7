//! mstm-ss library - Streaming Service module
//!
//! Serves stored audio over HTTP with single-range `Range` support and
//! publishes a one-shot playback event once a listener has heard enough of a
//! track.

use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod config;
pub mod delivery;
pub mod error;
pub mod events;
pub mod locator;
pub mod range;
pub mod session;
pub mod source;
pub mod trigger;

use config::StreamingConfig;
use events::EventDispatcher;
use locator::SongLocator;
use source::SourceOpener;
use trigger::TriggerPolicy;

/// Per-request tunables copied out of the configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSettings {
    pub chunk_size: usize,
    pub play_threshold: f64,
    pub trigger_policy: TriggerPolicy,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

impl From<&StreamingConfig> for StreamSettings {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            play_threshold: config.play_threshold,
            trigger_policy: config.trigger_policy,
        }
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub locator: Arc<dyn SongLocator>,
    pub sources: Arc<dyn SourceOpener>,
    pub dispatcher: EventDispatcher,
    pub settings: StreamSettings,
    /// Token signing secret; `None` disables authentication
    pub jwt_secret: Option<Arc<[u8]>>,
}

impl AppState {
    pub fn new(
        locator: Arc<dyn SongLocator>,
        sources: Arc<dyn SourceOpener>,
        dispatcher: EventDispatcher,
        settings: StreamSettings,
    ) -> Self {
        Self {
            locator,
            sources,
            dispatcher,
            settings,
            jwt_secret: None,
        }
    }

    pub fn with_jwt_secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.jwt_secret = Some(Arc::from(secret.as_ref()));
        self
    }
}

/// Build application router
///
/// `/stream` sits behind the auth middleware; `/health` is public.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::get;

    let protected = Router::new()
        .route("/stream", get(api::stream_song))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new().merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
