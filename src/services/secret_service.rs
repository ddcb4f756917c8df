use chrono::Utc;
use uuid::Uuid;

use crate::crypto::{preview_key, EncryptionService};
use crate::models::{ProviderKind, ProviderSecret, ProviderSecretInfo, UpsertProviderSecret};
use crate::services::config_cache::ConfigCache;
use crate::services::model_service::RegistryError;
use crate::store::ModelStore;

/// Store or replace the caller's key for `provider`.
pub async fn upsert_secret(
    store: &dyn ModelStore,
    crypto: &EncryptionService,
    cache: &ConfigCache,
    user_id: Uuid,
    provider: ProviderKind,
    body: UpsertProviderSecret,
) -> Result<ProviderSecretInfo, RegistryError> {
    let key = body.api_key.trim();
    if key.is_empty() {
        return Err(RegistryError::Validation("apiKey is required".into()));
    }

    let now = Utc::now();
    let secret = ProviderSecret {
        user_id,
        provider,
        encrypted_api_key: crypto.encrypt(key).map_err(RegistryError::Encryption)?,
        api_key_preview: preview_key(key),
        description: body.description.filter(|d| !d.trim().is_empty()),
        created_at: now,
        updated_at: now,
    };
    let saved = store.upsert_provider_secret(&secret).await?;
    cache.invalidate_user(user_id);

    tracing::info!(user_id = %user_id, %provider, "Provider secret saved");
    Ok(saved.into())
}

/// Previews only; ciphertext never leaves this layer.
pub async fn list_secrets(
    store: &dyn ModelStore,
    user_id: Uuid,
) -> Result<Vec<ProviderSecretInfo>, RegistryError> {
    let secrets = store.list_provider_secrets(user_id).await?;
    Ok(secrets.into_iter().map(ProviderSecretInfo::from).collect())
}

pub async fn delete_secret(
    store: &dyn ModelStore,
    cache: &ConfigCache,
    user_id: Uuid,
    provider: ProviderKind,
) -> Result<(), RegistryError> {
    if !store.delete_provider_secret(user_id, provider).await? {
        return Err(RegistryError::SecretNotFound(provider));
    }
    cache.invalidate_user(user_id);
    tracing::info!(user_id = %user_id, %provider, "Provider secret deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelConfig, ResolvedModel};
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn body(key: &str) -> UpsertProviderSecret {
        UpsertProviderSecret {
            api_key: key.into(),
            description: Some("personal".into()),
        }
    }

    #[tokio::test]
    async fn upsert_replaces_and_lists_previews() {
        let store = MemoryStore::new();
        let crypto = EncryptionService::from_key_material("secret service test");
        let cache = ConfigCache::new(Duration::from_secs(60), 16);
        let user = Uuid::new_v4();

        upsert_secret(&store, &crypto, &cache, user, ProviderKind::Anthropic, body("sk-ant-first-000000"))
            .await
            .unwrap();
        let saved = upsert_secret(&store, &crypto, &cache, user, ProviderKind::Anthropic, body("sk-ant-second-11111"))
            .await
            .unwrap();
        assert_eq!(saved.api_key_preview, "sk-ant...1111");

        let listed = list_secrets(&store, user).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].provider, ProviderKind::Anthropic);

        let stored = store
            .get_provider_secret(user, ProviderKind::Anthropic)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(crypto.decrypt(&stored.encrypted_api_key).unwrap(), "sk-ant-second-11111");
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let store = MemoryStore::new();
        let crypto = EncryptionService::from_key_material("secret service test");
        let err = upsert_secret(
            &store,
            &crypto,
            &ConfigCache::disabled(),
            Uuid::new_v4(),
            ProviderKind::OpenAI,
            body("  "),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
    }

    #[tokio::test]
    async fn changes_drop_the_users_cached_configs() {
        let store = MemoryStore::new();
        let crypto = EncryptionService::from_key_material("secret service test");
        let cache = ConfigCache::new(Duration::from_secs(60), 16);
        let user = Uuid::new_v4();
        let model = ModelConfig::for_test(ProviderKind::OpenAI, "http://x", "m");
        let cached = ResolvedModel {
            config: model.clone(),
            api_key: None,
        };

        cache.insert(model.id, Some(user), cached.clone());
        upsert_secret(&store, &crypto, &cache, user, ProviderKind::OpenAI, body("sk-fresh-key-123456"))
            .await
            .unwrap();
        assert!(cache.get(model.id, Some(user)).is_none());

        cache.insert(model.id, Some(user), cached);
        delete_secret(&store, &cache, user, ProviderKind::OpenAI).await.unwrap();
        assert!(cache.get(model.id, Some(user)).is_none());

        let missing = delete_secret(&store, &cache, user, ProviderKind::OpenAI).await;
        assert!(matches!(missing, Err(RegistryError::SecretNotFound(ProviderKind::OpenAI))));
    }
}
