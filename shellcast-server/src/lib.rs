//! # Shellcast Server
//!
//! HTTP front for the transcoding session manager.
//!
//! - `POST /api/v1/streams` starts a session for the proxy-authenticated user
//! - `GET /api/v1/streams/{id}` reports a session
//! - `DELETE /api/v1/streams/{id}` stops the caller's session
//! - the output root is served read-only under the public prefix, so every
//!   manifest URL handed out is directly fetchable

pub mod infra;
pub mod media;
pub mod routes;
pub mod stream;

pub use infra::app_state::AppState;

use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub fn create_app(state: AppState) -> Router {
    let prefix = mount_point(state.config().public_prefix());
    let output = ServeDir::new(state.config().output_root());

    Router::new()
        .route("/health", get(health_handler))
        .merge(routes::create_api_router())
        .nest_service(&prefix, output)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router paths must be absolute and must not end with `/`.
fn mount_point(prefix: &str) -> String {
    format!("/{}", prefix.trim().trim_matches('/'))
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.registry.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_point_is_normalised() {
        assert_eq!(mount_point("/streams"), "/streams");
        assert_eq!(mount_point("streams/"), "/streams");
        assert_eq!(mount_point("/media/hls/"), "/media/hls");
    }
}
