// Public API for the server binary and integration tests

pub mod config;
pub mod conn;
pub mod game;
pub mod lobby;
pub mod protocol;
pub mod room;
pub mod types;
pub mod ws;

use axum::{routing::get, Router};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

/// Build the HTTP router: the game socket on `/ws`, static files for the rest.
pub fn app(state: Arc<ws::AppState>, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
