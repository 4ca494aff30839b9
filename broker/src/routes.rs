//! Router construction.

use crate::connection;
use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

/// Build the broker's router.
///
/// The WebSocket endpoint is served on both `/` and `/ws`; there is a single
/// implicit topic and no authentication.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(connection::handle))
        .route("/ws", get(connection::handle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
