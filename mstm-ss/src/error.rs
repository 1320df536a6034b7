//! Error types for mstm-ss
//!
//! [`ApiError`] covers every failure detected *before* the first body byte is
//! written. Once streaming has started the status line is on the wire and
//! failures can only cut the connection (see `session`).

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mstm_common::api::ApiAuthError;
use serde_json::json;
use thiserror::Error;

/// Request-level error mapped to an HTTP response
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or malformed media id (400)
    #[error("{0}")]
    BadRequest(String),

    /// Media id unknown or media cannot be opened (404)
    #[error("{0}")]
    NotFound(String),

    /// `Range` header rejected (416)
    #[error("invalid range: {reason}")]
    RangeNotSatisfiable { size: u64, reason: String },

    /// Bearer token present but invalid (401)
    #[error("{0}")]
    Unauthorized(String),

    /// Anything else (500)
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ApiAuthError> for ApiError {
    fn from(err: ApiAuthError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
        }));

        let mut response = (status, body).into_response();

        // RFC 9110: 416 carries the current length of the resource
        if let ApiError::RangeNotSatisfiable { size, .. } = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::RangeNotSatisfiable { size: 1, reason: "x".into() }.status(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            ApiError::from(ApiAuthError::MalformedHeader).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_range_error_carries_content_range() {
        let response = ApiError::RangeNotSatisfiable {
            size: 1000,
            reason: "start beyond size".into(),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
    }
}
