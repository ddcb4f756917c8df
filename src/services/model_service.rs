//! Model registry: CRUD over model configs and the only place a `model_id`
//! turns into a ready-to-use config with its credential attached.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::{preview_key, CryptoError, EncryptionService};
use crate::llm::{Adapter, LlmError, Message, ProviderTransport, RequestParams};
use crate::models::{
    AuthType, Caller, CreateModel, ModelConfig, ProviderKind, ResolvedModel, SecretKey,
    UpdateModel,
};
use crate::services::config_cache::ConfigCache;
use crate::services::credential_service::resolve_api_key;
use crate::store::{ModelStore, StoreError};

/// Output budget for connection tests; just enough to prove the round trip.
const CONNECTION_TEST_MAX_TOKENS: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("model {0} not found")]
    NotFound(Uuid),

    #[error("no {0} secret stored")]
    SecretNotFound(ProviderKind),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("a user identity is required")]
    Unauthenticated,

    #[error("{0}")]
    Validation(String),

    /// Stored ciphertext could not be decrypted. Usually a key rotation
    /// without re-encryption.
    #[error("credential decryption failed: {0}")]
    Decryption(CryptoError),

    #[error("credential encryption failed: {0}")]
    Encryption(CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a reachability/auth probe against a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTest {
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ModelRegistry {
    store: Arc<dyn ModelStore>,
    crypto: Arc<EncryptionService>,
    cache: Arc<ConfigCache>,
    transport: ProviderTransport,
}

impl ModelRegistry {
    pub fn new(
        store: Arc<dyn ModelStore>,
        crypto: Arc<EncryptionService>,
        cache: Arc<ConfigCache>,
        transport: ProviderTransport,
    ) -> Self {
        Self {
            store,
            crypto,
            cache,
            transport,
        }
    }

    // ── Lookup ──────────────────────────────────────────────

    /// Enabled models visible to `user_id`: every global model plus the
    /// caller's own. Used to populate model pickers.
    pub async fn list_models(&self, user_id: Option<Uuid>) -> Result<Vec<ModelConfig>, RegistryError> {
        let models = self.store.list_models(user_id).await?;
        Ok(models.into_iter().filter(|m| m.enabled).collect())
    }

    /// Models the caller may edit, disabled ones included.
    pub async fn list_manageable_models(&self, caller: &Caller) -> Result<Vec<ModelConfig>, RegistryError> {
        let models = self.store.list_models(caller.user_id).await?;
        Ok(models
            .into_iter()
            .filter(|m| authorize_mutation(m, caller).is_ok())
            .collect())
    }

    /// Raw config without credential resolution. Disabled models are returned
    /// too so they can be edited.
    pub async fn get_model(&self, id: Uuid, user_id: Option<Uuid>) -> Result<ModelConfig, RegistryError> {
        self.store
            .get_model(id, user_id)
            .await?
            .ok_or(RegistryError::NotFound(id))
    }

    /// Config plus resolved credential, served from the cache when fresh.
    pub async fn get_model_config(
        &self,
        id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<ResolvedModel, RegistryError> {
        if let Some(hit) = self.cache.get(id, user_id) {
            tracing::trace!(model_id = %id, "Resolved config cache hit");
            return Ok(hit);
        }

        let config = self.get_model(id, user_id).await?;
        let credential =
            resolve_api_key(&config, user_id, self.store.as_ref(), &self.crypto).await?;
        let resolved = ResolvedModel {
            config,
            api_key: credential.key,
        };
        self.cache.insert(id, user_id, resolved.clone());
        Ok(resolved)
    }

    // ── Mutation ────────────────────────────────────────────

    pub async fn create_model(&self, dto: CreateModel, caller: &Caller) -> Result<ModelConfig, RegistryError> {
        let (mut model, api_key) = build_model(dto, caller)?;
        let (encrypted, preview) = self.seal_key(api_key.as_deref())?;
        model.encrypted_api_key = encrypted;
        model.api_key_preview = preview;

        self.store.insert_model(&model).await?;
        tracing::info!(
            model_id = %model.id,
            provider = %model.provider,
            global = model.is_global,
            "Model created"
        );
        Ok(model)
    }

    /// Apply a partial update. The stored key is only replaced when a new,
    /// non-empty one is supplied, or removed with `clear_api_key`.
    pub async fn update_model(
        &self,
        id: Uuid,
        dto: UpdateModel,
        caller: &Caller,
    ) -> Result<ModelConfig, RegistryError> {
        let mut model = self
            .store
            .find_model(id)
            .await?
            .ok_or(RegistryError::NotFound(id))?;
        authorize_mutation(&model, caller)?;

        if let Some(name) = dto.name {
            model.name = name.trim().to_string();
        }
        if let Some(description) = dto.description {
            model.description = description.filter(|d| !d.trim().is_empty());
        }
        if let Some(provider) = dto.provider {
            model.provider = provider.parse().map_err(RegistryError::Validation)?;
        }
        if let Some(base_url) = dto.base_url {
            model.base_url = base_url.trim().to_string();
        }
        if let Some(identifier) = dto.model_identifier {
            model.model_identifier = identifier.trim().to_string();
        }
        if let Some(auth_type) = dto.auth_type {
            model.auth_type = auth_type.parse().map_err(RegistryError::Validation)?;
        }
        if let Some(headers) = dto.auth_headers {
            model.auth_headers = headers.filter(|h| !h.is_empty());
        }
        if let Some(v) = dto.supports_streaming {
            model.supports_streaming = v;
        }
        if let Some(v) = dto.supports_functions {
            model.supports_functions = v;
        }
        if let Some(v) = dto.supports_vision {
            model.supports_vision = v;
        }
        if let Some(v) = dto.context_length {
            model.context_length = v;
        }
        if let Some(v) = dto.max_output_tokens {
            model.max_output_tokens = v;
        }
        if let Some(v) = dto.temperature {
            model.temperature = v;
        }
        if let Some(v) = dto.top_p {
            model.top_p = v;
        }
        if let Some(v) = dto.price_per_input_token {
            model.price_per_input_token = v;
        }
        if let Some(v) = dto.price_per_output_token {
            model.price_per_output_token = v;
        }
        if let Some(v) = dto.enabled {
            model.enabled = v;
        }

        if dto.clear_api_key {
            model.encrypted_api_key = None;
            model.api_key_preview = None;
        } else if let (Some(encrypted), preview) = self.seal_key(dto.api_key.as_deref())? {
            model.encrypted_api_key = Some(encrypted);
            model.api_key_preview = preview;
        }

        validate(&model)?;
        model.updated_at = Utc::now();

        self.store.update_model(&model).await?;
        self.cache.invalidate_model(id);
        tracing::info!(model_id = %id, "Model updated");
        Ok(model)
    }

    pub async fn delete_model(&self, id: Uuid, caller: &Caller) -> Result<(), RegistryError> {
        let model = self
            .store
            .find_model(id)
            .await?
            .ok_or(RegistryError::NotFound(id))?;
        authorize_mutation(&model, caller)?;

        if !self.store.delete_model(id).await? {
            return Err(RegistryError::NotFound(id));
        }
        self.cache.invalidate_model(id);
        tracing::info!(model_id = %id, "Model deleted");
        Ok(())
    }

    // ── Connection tests ────────────────────────────────────

    /// Issue a minimal request through the matching adapter. Nothing is
    /// persisted and provider failures are reported, not returned as errors.
    pub async fn test_connection(&self, target: &ResolvedModel) -> ConnectionTest {
        let adapter = Adapter::for_provider(target.config.provider);
        let params = RequestParams {
            max_tokens: Some(CONNECTION_TEST_MAX_TOKENS),
            ..RequestParams::for_model(&target.config, None, None, false)
        };

        let started = Instant::now();
        let result = self
            .transport
            .complete(target, adapter, &[Message::user("ping")], &[], &params)
            .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(_) => {
                tracing::info!(model_id = %target.config.id, latency_ms, "Connection test succeeded");
                ConnectionTest {
                    success: true,
                    latency_ms,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(model_id = %target.config.id, latency_ms, "Connection test failed: {}", e);
                ConnectionTest {
                    success: false,
                    latency_ms,
                    error: Some(describe_failure(&e)),
                }
            }
        }
    }

    pub async fn test_stored_model(&self, id: Uuid, caller: &Caller) -> Result<ConnectionTest, RegistryError> {
        let target = self.get_model_config(id, caller.user_id).await?;
        Ok(self.test_connection(&target).await)
    }

    /// Test a config before saving it. Without a key in the body, the
    /// caller's provider secret is used.
    pub async fn test_unsaved_model(
        &self,
        dto: CreateModel,
        caller: &Caller,
    ) -> Result<ConnectionTest, RegistryError> {
        let (config, api_key) = build_model(dto, caller)?;
        let api_key = match api_key {
            Some(key) => Some(SecretKey::new(key)),
            None => {
                resolve_api_key(&config, caller.user_id, self.store.as_ref(), &self.crypto)
                    .await?
                    .key
            }
        };
        Ok(self.test_connection(&ResolvedModel { config, api_key }).await)
    }

    fn seal_key(&self, plain: Option<&str>) -> Result<(Option<String>, Option<String>), RegistryError> {
        match plain.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => {
                let encrypted = self.crypto.encrypt(key).map_err(RegistryError::Encryption)?;
                Ok((Some(encrypted), Some(preview_key(key))))
            }
            None => Ok((None, None)),
        }
    }
}

/// Non-global models belong to their owner; global ones to admins.
fn authorize_mutation(model: &ModelConfig, caller: &Caller) -> Result<(), RegistryError> {
    if model.is_global {
        if caller.is_admin {
            return Ok(());
        }
        return Err(RegistryError::Forbidden(
            "global models can only be changed by an administrator",
        ));
    }
    match (model.owner_id, caller.user_id) {
        (Some(owner), Some(user)) if owner == user => Ok(()),
        _ => Err(RegistryError::Forbidden("model belongs to another user")),
    }
}

/// Validate a create body into an unsaved config. Returns the trimmed
/// plaintext key separately so it can be encrypted or used directly.
fn build_model(dto: CreateModel, caller: &Caller) -> Result<(ModelConfig, Option<String>), RegistryError> {
    let owner_id = if dto.is_global {
        if !caller.is_admin {
            return Err(RegistryError::Forbidden(
                "only administrators can create global models",
            ));
        }
        None
    } else {
        Some(caller.user_id.ok_or(RegistryError::Unauthenticated)?)
    };

    let provider: ProviderKind = dto.provider.parse().map_err(RegistryError::Validation)?;
    let auth_type: AuthType = dto.auth_type.parse().map_err(RegistryError::Validation)?;
    let api_key = dto
        .api_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    let now = Utc::now();
    let model = ModelConfig {
        id: Uuid::new_v4(),
        owner_id,
        name: dto.name.trim().to_string(),
        description: dto.description.filter(|d| !d.trim().is_empty()),
        provider,
        base_url: dto.base_url.trim().to_string(),
        model_identifier: dto.model_identifier.trim().to_string(),
        auth_type,
        encrypted_api_key: None,
        api_key_preview: None,
        auth_headers: dto.auth_headers.filter(|h| !h.is_empty()),
        supports_streaming: dto.supports_streaming,
        supports_functions: dto.supports_functions,
        supports_vision: dto.supports_vision,
        context_length: dto.context_length,
        max_output_tokens: dto.max_output_tokens,
        temperature: dto.temperature,
        top_p: dto.top_p,
        price_per_input_token: dto.price_per_input_token,
        price_per_output_token: dto.price_per_output_token,
        enabled: dto.enabled,
        is_global: dto.is_global,
        created_at: now,
        updated_at: now,
    };
    validate(&model)?;
    Ok((model, api_key))
}

fn validate(model: &ModelConfig) -> Result<(), RegistryError> {
    let invalid = |msg: &str| Err(RegistryError::Validation(msg.to_string()));

    if model.name.is_empty() {
        return invalid("name is required");
    }
    if model.model_identifier.is_empty() {
        return invalid("modelIdentifier is required");
    }
    match reqwest::Url::parse(&model.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => return invalid("baseUrl must be an absolute http(s) URL"),
    }
    if model.is_global && model.owner_id.is_some() {
        return invalid("global models cannot have an owner");
    }
    if model.auth_type == AuthType::CustomHeader && model.auth_headers.is_none() {
        return invalid("custom_header auth requires authHeaders");
    }
    if model.context_length <= 0 {
        return invalid("contextLength must be positive");
    }
    if model.max_output_tokens.is_some_and(|t| t <= 0) {
        return invalid("maxOutputTokens must be positive");
    }
    if model.temperature.is_some_and(|t| !(0.0..=2.0).contains(&t)) {
        return invalid("temperature must be between 0 and 2");
    }
    if model.top_p.is_some_and(|p| !(0.0..=1.0).contains(&p)) {
        return invalid("topP must be between 0 and 1");
    }
    let negative = |p: Option<f64>| p.is_some_and(|p| p < 0.0);
    if negative(model.price_per_input_token) || negative(model.price_per_output_token) {
        return invalid("prices cannot be negative");
    }
    Ok(())
}

/// Short description of a provider failure for the config owner.
fn describe_failure(e: &LlmError) -> String {
    match e {
        LlmError::Api { status, .. } if e.is_auth_failure() => {
            format!("authentication failed (status {status})")
        }
        LlmError::Api { status, .. } => format!("provider returned status {status}"),
        LlmError::Transport(_) | LlmError::Timeout(_) if e.is_timeout() => {
            "provider timed out".to_string()
        }
        // Unreachable in practice: `Timeout` always satisfies `is_timeout()`.
        LlmError::Timeout(_) => "provider timed out".to_string(),
        LlmError::Transport(_) => "could not reach provider".to_string(),
        LlmError::Parse { reason, .. } => format!("unexpected provider response: {reason}"),
        LlmError::Cancelled => "cancelled".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn registry() -> ModelRegistry {
        let store: Arc<dyn ModelStore> = Arc::new(MemoryStore::new());
        ModelRegistry::new(
            store,
            Arc::new(EncryptionService::from_key_material("registry test key")),
            Arc::new(ConfigCache::new(Duration::from_secs(300), 64)),
            ProviderTransport::new(reqwest::Client::new(), Duration::from_secs(5)),
        )
    }

    fn create_body(key: Option<&str>) -> CreateModel {
        serde_json::from_value(json!({
            "name": "GPT-4o mini",
            "provider": "openai",
            "baseUrl": "https://api.openai.com/v1",
            "modelIdentifier": "gpt-4o-mini",
            "authType": "bearer",
            "apiKey": key,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn create_encrypts_key_and_defaults_to_private() {
        let registry = registry();
        let user = Uuid::new_v4();
        let model = registry
            .create_model(create_body(Some("sk-proj-1234567890abcd")), &Caller::user(user))
            .await
            .unwrap();

        assert_eq!(model.owner_id, Some(user));
        assert!(!model.is_global);
        let encrypted = model.encrypted_api_key.as_deref().unwrap();
        assert!(!encrypted.contains("sk-proj"));
        assert_eq!(model.api_key_preview.as_deref(), Some("sk-pro...abcd"));

        let resolved = registry.get_model_config(model.id, Some(user)).await.unwrap();
        assert_eq!(resolved.api_key.unwrap().expose(), "sk-proj-1234567890abcd");
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let registry = registry();
        let caller = Caller::user(Uuid::new_v4());

        let mut body = create_body(None);
        body.base_url = "not a url".into();
        assert!(matches!(
            registry.create_model(body, &caller).await,
            Err(RegistryError::Validation(_))
        ));

        let mut body = create_body(None);
        body.provider = "bedrock".into();
        assert!(matches!(
            registry.create_model(body, &caller).await,
            Err(RegistryError::Validation(_))
        ));

        let mut body = create_body(None);
        body.temperature = Some(3.5);
        assert!(matches!(
            registry.create_model(body, &caller).await,
            Err(RegistryError::Validation(_))
        ));

        assert!(matches!(
            registry.create_model(create_body(None), &Caller::anonymous()).await,
            Err(RegistryError::Unauthenticated)
        ));

        let mut body = create_body(None);
        body.is_global = true;
        assert!(matches!(
            registry.create_model(body, &caller).await,
            Err(RegistryError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn listing_hides_other_users_and_disabled_models() {
        let registry = registry();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let mut global = create_body(None);
        global.is_global = true;
        registry
            .create_model(global, &Caller::admin(None))
            .await
            .unwrap();
        let own = registry
            .create_model(create_body(None), &Caller::user(alice))
            .await
            .unwrap();
        let mut disabled = create_body(None);
        disabled.enabled = false;
        let disabled = registry
            .create_model(disabled, &Caller::user(alice))
            .await
            .unwrap();
        registry
            .create_model(create_body(None), &Caller::user(bob))
            .await
            .unwrap();

        let listed = registry.list_models(Some(alice)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|m| m.id == own.id));
        assert!(listed.iter().all(|m| m.owner_id != Some(bob)));
        assert!(listed.iter().all(|m| m.enabled));

        assert_eq!(registry.list_models(None).await.unwrap().len(), 1);

        // Disabled models are still fetchable and manageable.
        assert!(registry.get_model(disabled.id, Some(alice)).await.is_ok());
        let manageable = registry
            .list_manageable_models(&Caller::user(alice))
            .await
            .unwrap();
        assert_eq!(manageable.len(), 2);
        assert!(manageable.iter().all(|m| !m.is_global));
    }

    #[tokio::test]
    async fn only_owners_mutate_private_models() {
        let registry = registry();
        let (owner, other) = (Uuid::new_v4(), Uuid::new_v4());
        let model = registry
            .create_model(create_body(None), &Caller::user(owner))
            .await
            .unwrap();

        for caller in [Caller::user(other), Caller::anonymous(), Caller::admin(Some(other))] {
            assert!(matches!(
                registry.delete_model(model.id, &caller).await,
                Err(RegistryError::Forbidden(_))
            ));
            assert!(matches!(
                registry
                    .update_model(model.id, UpdateModel::default(), &caller)
                    .await,
                Err(RegistryError::Forbidden(_))
            ));
        }

        registry
            .delete_model(model.id, &Caller::user(owner))
            .await
            .unwrap();
        assert!(matches!(
            registry.get_model(model.id, Some(owner)).await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn regular_users_cannot_touch_global_models() {
        let registry = registry();
        let mut body = create_body(None);
        body.is_global = true;
        let global = registry
            .create_model(body, &Caller::admin(None))
            .await
            .unwrap();

        let user = Caller::user(Uuid::new_v4());
        assert!(matches!(
            registry.delete_model(global.id, &user).await,
            Err(RegistryError::Forbidden(_))
        ));

        let renamed = registry
            .update_model(
                global.id,
                UpdateModel {
                    name: Some("Shared".into()),
                    ..Default::default()
                },
                &Caller::admin(None),
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Shared");
    }

    #[tokio::test]
    async fn update_keeps_key_unless_replaced_or_cleared() {
        let registry = registry();
        let user = Uuid::new_v4();
        let caller = Caller::user(user);
        let model = registry
            .create_model(create_body(Some("sk-original-key-0001")), &caller)
            .await
            .unwrap();
        // Prime the cache.
        registry.get_model_config(model.id, Some(user)).await.unwrap();

        let kept = registry
            .update_model(
                model.id,
                UpdateModel {
                    api_key: Some("   ".into()),
                    temperature: Some(Some(0.3)),
                    ..Default::default()
                },
                &caller,
            )
            .await
            .unwrap();
        assert_eq!(kept.encrypted_api_key, model.encrypted_api_key);
        assert_eq!(kept.temperature, Some(0.3));

        registry
            .update_model(
                model.id,
                UpdateModel {
                    api_key: Some("sk-rotated-key-0002".into()),
                    ..Default::default()
                },
                &caller,
            )
            .await
            .unwrap();
        let resolved = registry.get_model_config(model.id, Some(user)).await.unwrap();
        assert_eq!(resolved.api_key.unwrap().expose(), "sk-rotated-key-0002");

        let cleared = registry
            .update_model(
                model.id,
                UpdateModel {
                    clear_api_key: true,
                    ..Default::default()
                },
                &caller,
            )
            .await
            .unwrap();
        assert_eq!(cleared.encrypted_api_key, None);
        assert_eq!(cleared.api_key_preview, None);
    }

    #[tokio::test]
    async fn repeated_resolution_is_stable() {
        let registry = registry();
        let user = Uuid::new_v4();
        let model = registry
            .create_model(create_body(Some("sk-stable-key-123456")), &Caller::user(user))
            .await
            .unwrap();

        let first = registry.get_model_config(model.id, Some(user)).await.unwrap();
        let second = registry.get_model_config(model.id, Some(user)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn connection_test_reports_auth_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401)
                .json_body(json!({ "error": { "message": "Incorrect API key provided" } }));
        });

        let registry = registry();
        let mut body = create_body(Some("sk-wrong"));
        body.base_url = server.url("/v1");
        let result = registry
            .test_unsaved_model(body, &Caller::user(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("authentication failed (status 401)")
        );
    }

    #[tokio::test]
    async fn connection_test_succeeds_against_stored_model() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .json_body_includes(r#"{"max_tokens": 8}"#);
            then.status(200)
                .json_body(json!({ "choices": [{ "message": { "content": "pong" } }] }));
        });

        let registry = registry();
        let user = Uuid::new_v4();
        let mut body = create_body(None);
        body.base_url = server.url("/v1");
        let model = registry.create_model(body, &Caller::user(user)).await.unwrap();

        let result = registry
            .test_stored_model(model.id, &Caller::user(user))
            .await
            .unwrap();
        mock.assert();
        assert!(result.success);
        assert_eq!(result.error, None);
    }
}
