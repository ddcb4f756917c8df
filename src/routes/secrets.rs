use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Extension, Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Caller, ProviderKind, ProviderSecretInfo, UpsertProviderSecret};
use crate::services::secret_service;
use crate::state::AppState;

fn require_user(caller: &Caller) -> Result<Uuid, AppError> {
    caller.user_id.ok_or(AppError::Unauthorized)
}

fn parse_provider(raw: &str) -> Result<ProviderKind, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

/// GET /api/secrets: the caller's provider keys (previews only)
async fn list_secrets(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<ProviderSecretInfo>>, AppError> {
    let user_id = require_user(&caller)?;
    let secrets = secret_service::list_secrets(state.store.as_ref(), user_id).await?;
    Ok(Json(secrets))
}

/// PUT /api/secrets/{provider}
async fn upsert_secret(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(provider): Path<String>,
    Json(body): Json<UpsertProviderSecret>,
) -> Result<Json<ProviderSecretInfo>, AppError> {
    let user_id = require_user(&caller)?;
    let provider = parse_provider(&provider)?;
    let saved = secret_service::upsert_secret(
        state.store.as_ref(),
        &state.crypto,
        &state.cache,
        user_id,
        provider,
        body,
    )
    .await?;
    Ok(Json(saved))
}

/// DELETE /api/secrets/{provider}
async fn delete_secret(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(provider): Path<String>,
) -> Result<StatusCode, AppError> {
    let user_id = require_user(&caller)?;
    let provider = parse_provider(&provider)?;
    secret_service::delete_secret(state.store.as_ref(), &state.cache, user_id, provider).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/secrets", get(list_secrets))
        .route("/secrets/{provider}", put(upsert_secret).delete(delete_secret))
}
