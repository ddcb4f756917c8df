pub mod chat;
pub mod models;
pub mod secrets;
pub mod usage;

use std::sync::Arc;

use axum::{http::HeaderValue, middleware as axum_mw, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::auth::{caller_identity, USER_ID_HEADER};
use crate::state::AppState;

/// Full HTTP application: `/api/*` behind caller identification, plus CORS
/// and request tracing.
pub fn app(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .merge(chat::router())
        .merge(models::router())
        .merge(secrets::router())
        .merge(usage::router())
        .route_layer(axum_mw::from_fn_with_state(state.clone(), caller_identity));

    let allow_origin = if state.config.cors_origin == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .cors_origin
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        AllowOrigin::list(origins)
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static(USER_ID_HEADER),
        ]);

    Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
