use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model_config::ProviderKind;

/// One encrypted API key per (user, provider) pair, used as the fallback
/// credential for models without a key of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSecret {
    pub user_id: Uuid,
    pub provider: ProviderKind,
    pub encrypted_api_key: String,
    pub api_key_preview: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public info returned by list; never exposes the ciphertext.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSecretInfo {
    pub provider: ProviderKind,
    pub api_key_preview: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProviderSecret> for ProviderSecretInfo {
    fn from(s: ProviderSecret) -> Self {
        Self {
            provider: s.provider,
            api_key_preview: s.api_key_preview,
            description: s.description,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertProviderSecret {
    pub api_key: String,
    pub description: Option<String>,
}
