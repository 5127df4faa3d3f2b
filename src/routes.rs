use axum::routing::get;
use axum::Router;

use crate::logging;
use crate::state::AppState;
use crate::websocket::handlers::ws_handler;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .with_state(state);
    logging::add_tracing(router)
}

async fn healthz() -> &'static str {
    "ok"
}
