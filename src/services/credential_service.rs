use uuid::Uuid;

use crate::crypto::EncryptionService;
use crate::models::{AuthType, ModelConfig, SecretKey};
use crate::services::model_service::RegistryError;
use crate::store::ModelStore;

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ModelKey,
    ProviderSecret,
    None,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialSource::ModelKey => "model_key",
            CredentialSource::ProviderSecret => "provider_secret",
            CredentialSource::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCredential {
    pub key: Option<SecretKey>,
    pub source: CredentialSource,
}

/// Resolve the API key for `model`, first match wins:
///
/// 1. the model's own encrypted key,
/// 2. the caller's provider secret for `model.provider`,
/// 3. nothing.
///
/// A stored ciphertext that fails to decrypt aborts resolution instead of
/// falling through to the next source.
pub async fn resolve_api_key(
    model: &ModelConfig,
    user_id: Option<Uuid>,
    store: &dyn ModelStore,
    crypto: &EncryptionService,
) -> Result<ResolvedCredential, RegistryError> {
    if let Some(ciphertext) = &model.encrypted_api_key {
        let plain = crypto.decrypt(ciphertext).map_err(|e| {
            tracing::error!(
                model_id = %model.id,
                key_fingerprint = crypto.key_fingerprint(),
                "Failed to decrypt model API key: {}",
                e
            );
            RegistryError::Decryption(e)
        })?;
        return Ok(resolved(model, SecretKey::new(plain), CredentialSource::ModelKey));
    }

    if let Some(user_id) = user_id {
        if let Some(secret) = store.get_provider_secret(user_id, model.provider).await? {
            let plain = crypto.decrypt(&secret.encrypted_api_key).map_err(|e| {
                tracing::error!(
                    model_id = %model.id,
                    provider = %model.provider,
                    key_fingerprint = crypto.key_fingerprint(),
                    "Failed to decrypt provider secret: {}",
                    e
                );
                RegistryError::Decryption(e)
            })?;
            return Ok(resolved(
                model,
                SecretKey::new(plain),
                CredentialSource::ProviderSecret,
            ));
        }
    }

    if model.auth_type != AuthType::None {
        tracing::warn!(
            model_id = %model.id,
            provider = %model.provider,
            auth_type = model.auth_type.as_str(),
            "No credential available; request will be sent without one"
        );
    } else {
        tracing::debug!(model_id = %model.id, source = "none", "Resolved credential");
    }
    Ok(ResolvedCredential {
        key: None,
        source: CredentialSource::None,
    })
}

fn resolved(model: &ModelConfig, key: SecretKey, source: CredentialSource) -> ResolvedCredential {
    tracing::debug!(model_id = %model.id, source = source.as_str(), "Resolved credential");
    ResolvedCredential {
        key: Some(key),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{preview_key, CryptoError};
    use crate::models::{ProviderKind, ProviderSecret};
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn crypto() -> EncryptionService {
        EncryptionService::from_key_material("credential resolver test passphrase")
    }

    async fn store_secret(store: &MemoryStore, crypto: &EncryptionService, user: Uuid, key: &str) {
        let now = Utc::now();
        store
            .upsert_provider_secret(&ProviderSecret {
                user_id: user,
                provider: ProviderKind::OpenAI,
                encrypted_api_key: crypto.encrypt(key).unwrap(),
                api_key_preview: preview_key(key),
                description: None,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
    }

    fn model(crypto: &EncryptionService, own_key: Option<&str>) -> ModelConfig {
        let mut m = ModelConfig::for_test(ProviderKind::OpenAI, "https://api.openai.com/v1", "gpt-4o-mini");
        m.auth_type = AuthType::Bearer;
        m.encrypted_api_key = own_key.map(|k| crypto.encrypt(k).unwrap());
        m
    }

    #[tokio::test]
    async fn model_key_wins_over_provider_secret() {
        let crypto = crypto();
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store_secret(&store, &crypto, user, "sk-secret").await;

        let got = resolve_api_key(&model(&crypto, Some("sk-model")), Some(user), &store, &crypto)
            .await
            .unwrap();
        assert_eq!(got.source, CredentialSource::ModelKey);
        assert_eq!(got.key.unwrap().expose(), "sk-model");
    }

    #[tokio::test]
    async fn provider_secret_is_the_fallback() {
        let crypto = crypto();
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store_secret(&store, &crypto, user, "sk-secret").await;

        let got = resolve_api_key(&model(&crypto, None), Some(user), &store, &crypto)
            .await
            .unwrap();
        assert_eq!(got.source, CredentialSource::ProviderSecret);
        assert_eq!(got.key.unwrap().expose(), "sk-secret");

        // Another user's secret is never used.
        let stranger = resolve_api_key(&model(&crypto, None), Some(Uuid::new_v4()), &store, &crypto)
            .await
            .unwrap();
        assert_eq!(stranger.source, CredentialSource::None);
    }

    #[tokio::test]
    async fn nothing_resolves_to_none() {
        let crypto = crypto();
        let store = MemoryStore::new();
        let got = resolve_api_key(&model(&crypto, None), None, &store, &crypto)
            .await
            .unwrap();
        assert_eq!(got.key, None);
        assert_eq!(got.source, CredentialSource::None);
    }

    #[tokio::test]
    async fn undecryptable_model_key_fails_closed() {
        let crypto = crypto();
        let other = EncryptionService::from_key_material("a different key");
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store_secret(&store, &crypto, user, "sk-secret").await;

        // Encrypted under another key: must not fall through to the secret.
        let broken = model(&other, Some("sk-model"));
        let err = resolve_api_key(&broken, Some(user), &store, &crypto)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Decryption(CryptoError::Authentication)
        ));
    }
}
