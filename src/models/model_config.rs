use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Supported provider families.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Ollama,
    HuggingFace,
    Azure,
    Custom,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::OpenAI,
        ProviderKind::Anthropic,
        ProviderKind::Ollama,
        ProviderKind::HuggingFace,
        ProviderKind::Azure,
        ProviderKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
            ProviderKind::HuggingFace => "huggingface",
            ProviderKind::Azure => "azure",
            ProviderKind::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .ok_or_else(|| {
                format!(
                    "Unknown provider: {s}. Supported: openai, anthropic, ollama, huggingface, azure, custom"
                )
            })
    }
}

/// How the resolved credential is attached to provider requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Provider-specific key header (`x-api-key`, Azure's `api-key`).
    ApiKey,
    /// Only the configured `auth_headers`, with `{api_key}` substituted.
    CustomHeader,
    None,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Bearer => "bearer",
            AuthType::ApiKey => "api_key",
            AuthType::CustomHeader => "custom_header",
            AuthType::None => "none",
        }
    }
}

impl FromStr for AuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bearer" => Ok(AuthType::Bearer),
            "api_key" => Ok(AuthType::ApiKey),
            "custom_header" => Ok(AuthType::CustomHeader),
            "none" => Ok(AuthType::None),
            _ => Err(format!(
                "Unknown auth type: {s}. Supported: bearer, api_key, custom_header, none"
            )),
        }
    }
}

/// One addressable LLM endpoint.
///
/// `encrypted_api_key` is ciphertext produced by the encryption service and is
/// never serialized to clients; see [`ModelInfo`] for the public view.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub id: Uuid,
    /// `None` for global models.
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub provider: ProviderKind,
    pub base_url: String,
    /// The provider's own model name (e.g. "gpt-4o-mini").
    pub model_identifier: String,
    pub auth_type: AuthType,
    pub encrypted_api_key: Option<String>,
    pub api_key_preview: Option<String>,
    pub auth_headers: Option<HashMap<String, String>>,
    pub supports_streaming: bool,
    pub supports_functions: bool,
    pub supports_vision: bool,
    pub context_length: i32,
    pub max_output_tokens: Option<i32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub price_per_input_token: Option<f64>,
    pub price_per_output_token: Option<f64>,
    pub enabled: bool,
    pub is_global: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelConfig {
    /// Whether `user_id` may see this model at all.
    pub fn is_visible_to(&self, user_id: Option<Uuid>) -> bool {
        self.is_global || (self.owner_id.is_some() && self.owner_id == user_id)
    }

    /// Cost of one call from the per-token prices. `None` when the model has
    /// no pricing configured.
    pub fn estimate_cost(&self, input_tokens: u32, output_tokens: u32) -> Option<f64> {
        if self.price_per_input_token.is_none() && self.price_per_output_token.is_none() {
            return None;
        }
        let input = self.price_per_input_token.unwrap_or(0.0) * f64::from(input_tokens);
        let output = self.price_per_output_token.unwrap_or(0.0) * f64::from(output_tokens);
        Some(input + output)
    }
}

#[cfg(test)]
impl ModelConfig {
    /// A global, enabled, keyless model for unit tests.
    pub(crate) fn for_test(provider: ProviderKind, base_url: &str, model: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: None,
            name: format!("{provider} test"),
            description: None,
            provider,
            base_url: base_url.to_string(),
            model_identifier: model.to_string(),
            auth_type: AuthType::None,
            encrypted_api_key: None,
            api_key_preview: None,
            auth_headers: None,
            supports_streaming: true,
            supports_functions: true,
            supports_vision: false,
            context_length: 8192,
            max_output_tokens: None,
            temperature: None,
            top_p: None,
            price_per_input_token: None,
            price_per_output_token: None,
            enabled: true,
            is_global: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Public info returned by list/get; never exposes the ciphertext.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub provider: ProviderKind,
    pub base_url: String,
    pub model_identifier: String,
    pub auth_type: AuthType,
    pub has_api_key: bool,
    pub api_key_preview: Option<String>,
    /// Header names only; values may carry credentials.
    pub auth_header_names: Vec<String>,
    pub supports_streaming: bool,
    pub supports_functions: bool,
    pub supports_vision: bool,
    pub context_length: i32,
    pub max_output_tokens: Option<i32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub price_per_input_token: Option<f64>,
    pub price_per_output_token: Option<f64>,
    pub enabled: bool,
    pub is_global: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ModelConfig> for ModelInfo {
    fn from(m: ModelConfig) -> Self {
        let mut auth_header_names: Vec<String> = m
            .auth_headers
            .map(|h| h.into_keys().collect())
            .unwrap_or_default();
        auth_header_names.sort();

        Self {
            id: m.id,
            owner_id: m.owner_id,
            name: m.name,
            description: m.description,
            provider: m.provider,
            base_url: m.base_url,
            model_identifier: m.model_identifier,
            auth_type: m.auth_type,
            has_api_key: m.encrypted_api_key.is_some(),
            api_key_preview: m.api_key_preview,
            auth_header_names,
            supports_streaming: m.supports_streaming,
            supports_functions: m.supports_functions,
            supports_vision: m.supports_vision,
            context_length: m.context_length,
            max_output_tokens: m.max_output_tokens,
            temperature: m.temperature,
            top_p: m.top_p,
            price_per_input_token: m.price_per_input_token,
            price_per_output_token: m.price_per_output_token,
            enabled: m.enabled,
            is_global: m.is_global,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Keeps an explicit `null` distinct from a missing field.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn default_true() -> bool {
    true
}

fn default_context_length() -> i32 {
    4096
}

/// Body of a create request. `api_key` is plaintext and is encrypted before it
/// is persisted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModel {
    pub name: String,
    pub description: Option<String>,
    pub provider: String,
    pub base_url: String,
    pub model_identifier: String,
    pub auth_type: String,
    pub api_key: Option<String>,
    pub auth_headers: Option<HashMap<String, String>>,
    #[serde(default = "default_true")]
    pub supports_streaming: bool,
    #[serde(default)]
    pub supports_functions: bool,
    #[serde(default)]
    pub supports_vision: bool,
    #[serde(default = "default_context_length")]
    pub context_length: i32,
    pub max_output_tokens: Option<i32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub price_per_input_token: Option<f64>,
    pub price_per_output_token: Option<f64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Only honoured for admins.
    #[serde(default)]
    pub is_global: bool,
}

/// Body of an update request. Omitted fields keep their current value; an
/// omitted or empty `api_key` keeps the stored key unless `clear_api_key` is set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateModel {
    pub name: Option<String>,
    /// `null` clears the description.
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model_identifier: Option<String>,
    pub auth_type: Option<String>,
    pub api_key: Option<String>,
    #[serde(default)]
    pub clear_api_key: bool,
    /// `null` clears the headers.
    #[serde(default, deserialize_with = "double_option")]
    pub auth_headers: Option<Option<HashMap<String, String>>>,
    pub supports_streaming: Option<bool>,
    pub supports_functions: Option<bool>,
    pub supports_vision: Option<bool>,
    pub context_length: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_output_tokens: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub temperature: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub top_p: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub price_per_input_token: Option<Option<f64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub price_per_output_token: Option<Option<f64>>,
    pub enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        assert_eq!(
            "huggingface".parse::<ProviderKind>().unwrap(),
            ProviderKind::HuggingFace
        );
        assert!("bedrock".parse::<ProviderKind>().is_err());
        assert_eq!(
            serde_json::to_string(&ProviderKind::HuggingFace).unwrap(),
            "\"huggingface\""
        );
    }

    #[test]
    fn auth_type_round_trips_through_str() {
        for auth in [
            AuthType::Bearer,
            AuthType::ApiKey,
            AuthType::CustomHeader,
            AuthType::None,
        ] {
            assert_eq!(auth.as_str().parse::<AuthType>().unwrap(), auth);
        }
    }

    #[test]
    fn cost_needs_pricing() {
        let mut m = ModelConfig::for_test(ProviderKind::OpenAI, "http://x", "m");
        assert_eq!(m.estimate_cost(100, 10), None);
        m.price_per_input_token = Some(0.001);
        m.price_per_output_token = Some(0.002);
        let cost = m.estimate_cost(100, 10).unwrap();
        assert!((cost - 0.12).abs() < 1e-9);
    }

    #[test]
    fn update_distinguishes_null_from_missing() {
        let body: UpdateModel =
            serde_json::from_str(r#"{"description": null, "temperature": 0.2}"#).unwrap();
        assert_eq!(body.description, Some(None));
        assert_eq!(body.temperature, Some(Some(0.2)));
        assert!(body.top_p.is_none());
        assert!(!body.clear_api_key);
    }
}
