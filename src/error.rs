use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::llm::{ClientError, LlmError};
use crate::services::model_service::RegistryError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Provider(#[from] LlmError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ClientError> for AppError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Registry(e) => AppError::Registry(e),
            ClientError::Provider(e) => AppError::Provider(e),
        }
    }
}

fn internal() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

impl AppError {
    pub(crate) fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "A user identity is required".to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Registry(e) => match e {
                RegistryError::NotFound(_) => {
                    (StatusCode::NOT_FOUND, "This model is unavailable".to_string())
                }
                RegistryError::SecretNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                RegistryError::Forbidden(msg) => (StatusCode::FORBIDDEN, capitalize(msg)),
                RegistryError::Unauthenticated => (
                    StatusCode::UNAUTHORIZED,
                    "A user identity is required".to_string(),
                ),
                RegistryError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                RegistryError::Decryption(_) => {
                    tracing::error!("Credential error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Stored credentials for this model could not be read".to_string(),
                    )
                }
                RegistryError::Encryption(_) => {
                    tracing::error!("Credential error: {}", e);
                    internal()
                }
                RegistryError::Store(e) => {
                    tracing::error!("Database error: {}", e);
                    internal()
                }
            },
            AppError::Provider(e) => {
                tracing::error!("Provider error: {}", e);
                match e {
                    LlmError::Api { .. } if e.is_auth_failure() => (
                        StatusCode::BAD_GATEWAY,
                        "Authentication failed for this model".to_string(),
                    ),
                    LlmError::Transport(_) | LlmError::Timeout(_) if e.is_timeout() => (
                        StatusCode::GATEWAY_TIMEOUT,
                        "The model provider timed out".to_string(),
                    ),
                    // 499: client closed request
                    LlmError::Cancelled => (
                        StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
                        "Request cancelled".to_string(),
                    ),
                    _ => (
                        StatusCode::BAD_GATEWAY,
                        "The model provider returned an error".to_string(),
                    ),
                }
            }
            AppError::Store(e) => {
                tracing::error!("Database error: {}", e);
                internal()
            }
        }
    }
}

fn capitalize(msg: &str) -> String {
    let mut chars = msg.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        let body = Json(json!({ "error": { "message": message } }));
        (status, body).into_response()
    }
}
