use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{Caller, UsageListResponse};
use crate::services::usage_service;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// GET /api/usage: the caller's usage log, newest first
async fn list_usage(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageListResponse>, AppError> {
    let user_id = caller.user_id.ok_or(AppError::Unauthorized)?;
    let result = usage_service::list_usage(
        state.store.as_ref(),
        user_id,
        query.page.unwrap_or(1),
        query.per_page.unwrap_or(20),
    )
    .await?;
    Ok(Json(result))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/usage", get(list_usage))
}
