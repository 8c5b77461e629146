use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    server::AppState,
    transport::{
        middleware::add_response_headers,
        routes::{presence, status},
    },
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(status::ping))
        .route("/update", post(presence::update))
        .route("/clear", post(presence::clear))
        .fallback(status::not_found)
        .layer(middleware::from_fn(add_response_headers))
        // Browser extensions post from extension origins, so CORS stays
        // wide open; the listener is loopback-only.
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
