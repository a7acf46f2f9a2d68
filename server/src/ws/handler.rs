use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
/// Viewer channel. Upgrades to a WebSocket and hands the socket to the
/// connection actor. Upgrade failures are logged and only affect this request.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!(peer = %peer, error = %rejection, "WebSocket upgrade rejected");
            return rejection.into_response();
        }
    };

    ws.on_failed_upgrade(move |error| {
        tracing::warn!(peer = %peer, error = %error, "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| actor::run_connection(socket, state, Some(peer)))
}
