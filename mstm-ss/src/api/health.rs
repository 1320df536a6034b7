//! Health check endpoint
//!
//! Besides liveness, reports how this instance counts plays so operators can
//! tell a log-only deployment from one publishing to the broker.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::trigger::TriggerPolicy;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    /// Bearer tokens are checked on `/stream`
    pub auth_enabled: bool,
    /// Where playback events go (`amqp`, `log`, ...)
    pub event_sink: &'static str,
    pub trigger_policy: TriggerPolicy,
    pub play_threshold: f64,
}

/// GET /health (no authentication)
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        module: "mstm-ss",
        version: env!("CARGO_PKG_VERSION"),
        auth_enabled: state.jwt_secret.is_some(),
        event_sink: state.dispatcher.sink_kind(),
        trigger_policy: state.settings.trigger_policy,
        play_threshold: state.settings.play_threshold,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
