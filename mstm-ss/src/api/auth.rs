//! Bearer-token authentication middleware
//!
//! Identity is optional: a request without an `Authorization` header streams
//! anonymously and never produces a playback event. A header that is present
//! but malformed, or a token that fails validation, is rejected with 401
//! before the handler runs.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use mstm_common::api::{parse_bearer, validate_token};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::AppState;

/// Authenticated caller, inserted as a request extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub u64);

/// Authentication middleware
///
/// Applied to `/stream` only. With no secret configured every request
/// passes through anonymously.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(secret) = state.jwt_secret.as_deref() else {
        return Ok(next.run(request).await);
    };

    let Some(value) = request.headers().get(header::AUTHORIZATION).cloned() else {
        return Ok(next.run(request).await);
    };

    let value = value.to_str().map_err(|_| {
        ApiError::Unauthorized("authorization header is not valid text".to_string())
    })?;

    let token = parse_bearer(value)?;
    let claims = validate_token(token, secret).map_err(|e| {
        warn!("Rejected bearer token: {}", e);
        ApiError::from(e)
    })?;

    match claims.user_id() {
        Some(user_id) => {
            request.extensions_mut().insert(AuthenticatedUser(user_id));
        }
        None => {
            debug!("Token carries no usable user_id, streaming anonymously");
        }
    }

    Ok(next.run(request).await)
}
