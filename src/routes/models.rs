use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Caller, CreateModel, ModelInfo, UpdateModel};
use crate::services::model_service::ConnectionTest;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListModelsQuery {
    /// Everything the caller can manage, disabled models included.
    #[serde(default)]
    pub all: bool,
}

/// GET /api/models: models usable by the caller
async fn list_models(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListModelsQuery>,
) -> Result<Json<Vec<ModelInfo>>, AppError> {
    let models = if query.all {
        state.registry.list_manageable_models(&caller).await?
    } else {
        state.registry.list_models(caller.user_id).await?
    };
    Ok(Json(models.into_iter().map(ModelInfo::from).collect()))
}

/// POST /api/models: create a model config
async fn create_model(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateModel>,
) -> Result<impl IntoResponse, AppError> {
    let model = state.registry.create_model(body, &caller).await?;
    Ok((StatusCode::CREATED, Json(ModelInfo::from(model))))
}

/// GET /api/models/{id}
async fn get_model(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ModelInfo>, AppError> {
    let model = state.registry.get_model(id, caller.user_id).await?;
    Ok(Json(model.into()))
}

/// PUT /api/models/{id}
async fn update_model(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateModel>,
) -> Result<Json<ModelInfo>, AppError> {
    let model = state.registry.update_model(id, body, &caller).await?;
    Ok(Json(model.into()))
}

/// DELETE /api/models/{id}
async fn delete_model(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.registry.delete_model(id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/models/test: probe a config before saving it
async fn test_unsaved(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<CreateModel>,
) -> Result<Json<ConnectionTest>, AppError> {
    Ok(Json(state.registry.test_unsaved_model(body, &caller).await?))
}

/// POST /api/models/{id}/test
async fn test_stored(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionTest>, AppError> {
    Ok(Json(state.registry.test_stored_model(id, &caller).await?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/models", get(list_models).post(create_model))
        .route("/models/test", post(test_unsaved))
        .route(
            "/models/{id}",
            get(get_model).put(update_model).delete(delete_model),
        )
        .route("/models/{id}/test", post(test_stored))
}
