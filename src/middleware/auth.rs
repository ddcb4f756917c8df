use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Caller;
use crate::state::AppState;

/// Set by the upstream authentication layer.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extract a Bearer token from the Authorization header.
fn extract_bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": { "message": message } }))).into_response()
}

/// Build the [`Caller`] for this request and put it into the extensions.
///
/// No `x-user-id` means an anonymous caller, which can still read global
/// models. A bearer token, when present, must be the admin key.
pub async fn caller_identity(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let user_id = match req.headers().get(USER_ID_HEADER) {
        None => None,
        Some(raw) => match raw.to_str().ok().and_then(|v| Uuid::parse_str(v.trim()).ok()) {
            Some(id) => Some(id),
            None => return reject(StatusCode::BAD_REQUEST, "Invalid x-user-id header"),
        },
    };

    let is_admin = match extract_bearer(&req) {
        None => false,
        Some(token) if token == state.config.admin_key => true,
        Some(_) => return reject(StatusCode::UNAUTHORIZED, "Invalid admin key"),
    };

    let caller = Caller { user_id, is_admin };
    tracing::trace!(user_id = ?caller.user_id, is_admin, "Caller identified");
    req.extensions_mut().insert(caller);
    next.run(req).await
}
