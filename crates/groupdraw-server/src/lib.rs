//! GroupDraw WebSocket Relay Server
//!
//! Relays opaque sync payloads between the members of a room. The relay
//! keeps no drawing state: catch-up is handled by the peers themselves.
//!
//! ## Protocol
//!
//! JSON messages tagged by `"type"` (see [`groupdraw_core::relay`]):
//! ```json
//! { "type": "join", "room": "room-id", "participant": "<uuid>" }
//! { "type": "send", "to": ["<uuid>"], "data": "<base64 payload>" }
//! ```

pub mod config;
pub mod room;
pub mod ws;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::{ConfigError, ServerConfig};
pub use room::{AppState, Envelope};

/// Build the relay's routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "GroupDraw Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}
