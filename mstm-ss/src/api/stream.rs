//! Streaming endpoint
//!
//! `GET /stream?id=<mediaId>` with an optional single `Range: bytes=` header.
//!
//! Everything that can fail with a status code (id parsing, lookup, open,
//! range validation) happens before the response is built. The body is then
//! produced by a [`StreamSession`] running on its own task and feeding a
//! bounded channel; see `session` for what happens after the first byte.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, Method},
    response::Response,
    Extension,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::auth::AuthenticatedUser;
use crate::delivery::body_channel;
use crate::error::ApiError;
use crate::range::{resolve, RangeResolution};
use crate::session::StreamSession;
use crate::source::SourceGuard;
use crate::trigger::PlaybackTrigger;
use crate::AppState;

/// Content type of every streamed resource
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    /// Kept as text so a bad id is reported as 400 by us, not by the extractor
    pub id: Option<String>,
}

/// Parse the `id` query parameter
fn parse_media_id(raw: Option<&str>) -> Result<u64, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("media id required".to_string()))?;

    raw.parse::<u64>()
        .map_err(|_| ApiError::BadRequest(format!("invalid media id: {}", raw)))
}

/// GET /stream
pub async fn stream_song(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
    user: Option<Extension<AuthenticatedUser>>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let media_id = parse_media_id(params.id.as_deref())?;
    let user_id = user.map(|Extension(AuthenticatedUser(id))| id);

    let location = state.locator.locate(media_id).await.map_err(|e| {
        debug!(song_id = media_id, "Lookup failed: {}", e);
        ApiError::NotFound(format!("song {} not found", media_id))
    })?;

    let source = state.sources.open(&location).await.map_err(|e| {
        warn!(song_id = media_id, "Cannot open {}: {}", location, e);
        ApiError::NotFound(format!("song {} not available", media_id))
    })?;

    // From here on the guard closes the source on every exit path
    let source = SourceGuard::new(source);
    let size = source.size();

    let range_header = match headers.get(header::RANGE) {
        Some(value) => Some(value.to_str().map_err(|_| ApiError::RangeNotSatisfiable {
            size,
            reason: "range header is not valid text".to_string(),
        })?),
        None => None,
    };

    let resolution = resolve(range_header, size).map_err(|e| ApiError::RangeNotSatisfiable {
        size,
        reason: e.to_string(),
    })?;

    let mut response = Response::builder()
        .status(resolution.status())
        .header(header::CONTENT_TYPE, AUDIO_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, resolution.content_length())
        .header(header::ACCEPT_RANGES, "bytes");

    if let Some(content_range) = resolution.content_range() {
        let value = HeaderValue::from_str(&content_range)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        response = response.header(header::CONTENT_RANGE, value);
    }

    // HEAD: headers only, no delivery and so no playback event
    if method == Method::HEAD {
        return response
            .body(Body::empty())
            .map_err(|e| ApiError::Internal(e.to_string()));
    }

    let settings = &state.settings;
    let trigger = match resolution {
        RangeResolution::Partial { range, size } => PlaybackTrigger::for_range(
            range.start,
            size,
            settings.play_threshold,
            user_id,
            media_id,
            state.dispatcher.clone(),
        ),
        RangeResolution::FullExtent { size } => PlaybackTrigger::for_full_extent(
            settings.trigger_policy,
            size,
            settings.play_threshold,
            user_id,
            media_id,
            state.dispatcher.clone(),
        ),
    };

    info!(
        song_id = media_id,
        user_id = ?user_id,
        status = resolution.status().as_u16(),
        length = resolution.content_length(),
        "Streaming"
    );

    let session = StreamSession::new(media_id, source, resolution, trigger, settings.chunk_size);
    let (sink, body) = body_channel();
    tokio::spawn(session.stream_to_body(sink));

    response
        .body(Body::from_stream(body))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_id() {
        assert_eq!(parse_media_id(Some("42")).unwrap(), 42);
        assert_eq!(parse_media_id(Some(" 7 ")).unwrap(), 7);

        for bad in [None, Some(""), Some("  ")] {
            match parse_media_id(bad) {
                Err(ApiError::BadRequest(msg)) => assert_eq!(msg, "media id required"),
                other => panic!("expected BadRequest, got {:?}", other),
            }
        }

        for bad in ["abc", "-1", "1.5"] {
            assert!(matches!(parse_media_id(Some(bad)), Err(ApiError::BadRequest(_))));
        }
    }
}
