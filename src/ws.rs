use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::IntoResponse,
};
use std::sync::Arc;

use crate::config::ConnConfig;
use crate::conn;
use crate::lobby::Lobby;

/// Shared state for the HTTP layer
pub struct AppState {
    pub lobby: Arc<Lobby>,
    pub conn: ConnConfig,
}

impl AppState {
    pub fn new(lobby: Arc<Lobby>, conn: ConnConfig) -> Self {
        Self { lobby, conn }
    }
}

/// WebSocket upgrade handler. Every socket starts out in the lobby.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.max_message_size(state.conn.max_message_size)
        .on_upgrade(move |socket| async move {
            let (sender, receiver) = conn::spawn(socket, &state.conn);
            tracing::info!(conn = %sender.id(), "WebSocket connected");
            state.lobby.handle(sender, receiver).await;
        })
}
