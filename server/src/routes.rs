mod auth;

use crate::serve::AppState;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use http::StatusCode;
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router<()> {
    Router::new()
        // Note that the HTTP verb 'GET' here is required by RFC6455 §4.1: "The method of the
        // request MUST be GET" (regarding WebSocket HTTP handshakes).
        //  GET /auth?client_id=<client ID>
        .route("/auth", get(auth::connect))
        // utility
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "no such route")
}
