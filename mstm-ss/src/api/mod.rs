//! HTTP API handlers for mstm-ss

pub mod auth;
pub mod health;
pub mod stream;

pub use auth::{auth_middleware, AuthenticatedUser};
pub use health::health_routes;
pub use stream::stream_song;
