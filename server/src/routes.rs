use axum::{
    handler::HandlerWithoutStateExt,
    routing::{get, post},
    Router,
};
use tower_http::services::ServeDir;

use crate::assets;
use crate::positions::{api, ingress};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Build the full axum Router with all routes.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`;
/// the viewer channel reads the peer address.
pub fn build_router(state: AppState) -> Router {
    let static_files =
        ServeDir::new(&state.static_dir).fallback(assets::bundled_index.into_service());

    Router::new()
        .route("/position", post(ingress::report_position))
        .route("/api/history", get(api::history))
        .route("/api/last-position", get(api::last_position))
        .route("/api/config", get(api::map_config))
        .route("/ws", get(ws_handler::ws_upgrade))
        .fallback_service(static_files)
        .with_state(state)
}
