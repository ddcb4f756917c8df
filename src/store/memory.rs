use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ModelStore, StoreError};
use crate::models::{ModelConfig, NewUsageRecord, ProviderKind, ProviderSecret, UsageRecord};

/// In-process store for tests and database-less local runs. Nothing survives
/// a restart.
#[derive(Default)]
pub struct MemoryStore {
    models: RwLock<HashMap<Uuid, ModelConfig>>,
    secrets: RwLock<HashMap<(Uuid, ProviderKind), ProviderSecret>>,
    usage: RwLock<Vec<UsageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn list_models(&self, viewer: Option<Uuid>) -> Result<Vec<ModelConfig>, StoreError> {
        let models = self.models.read().await;
        let mut visible: Vec<ModelConfig> = models
            .values()
            .filter(|m| m.is_visible_to(viewer))
            .cloned()
            .collect();
        visible.sort_by(|a, b| {
            b.is_global
                .cmp(&a.is_global)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(visible)
    }

    async fn get_model(
        &self,
        id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Option<ModelConfig>, StoreError> {
        let models = self.models.read().await;
        Ok(models.get(&id).filter(|m| m.is_visible_to(viewer)).cloned())
    }

    async fn find_model(&self, id: Uuid) -> Result<Option<ModelConfig>, StoreError> {
        Ok(self.models.read().await.get(&id).cloned())
    }

    async fn insert_model(&self, model: &ModelConfig) -> Result<(), StoreError> {
        self.models.write().await.insert(model.id, model.clone());
        Ok(())
    }

    async fn update_model(&self, model: &ModelConfig) -> Result<(), StoreError> {
        let mut models = self.models.write().await;
        if let Some(existing) = models.get_mut(&model.id) {
            let created_at = existing.created_at;
            *existing = model.clone();
            existing.created_at = created_at;
        }
        Ok(())
    }

    async fn delete_model(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.models.write().await.remove(&id).is_some())
    }

    async fn get_provider_secret(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<Option<ProviderSecret>, StoreError> {
        Ok(self.secrets.read().await.get(&(user_id, provider)).cloned())
    }

    async fn list_provider_secrets(&self, user_id: Uuid) -> Result<Vec<ProviderSecret>, StoreError> {
        let secrets = self.secrets.read().await;
        let mut owned: Vec<ProviderSecret> = secrets
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|s| s.provider.as_str());
        Ok(owned)
    }

    async fn upsert_provider_secret(
        &self,
        secret: &ProviderSecret,
    ) -> Result<ProviderSecret, StoreError> {
        let mut secrets = self.secrets.write().await;
        let key = (secret.user_id, secret.provider);
        let mut stored = secret.clone();
        if let Some(existing) = secrets.get(&key) {
            stored.created_at = existing.created_at;
        }
        secrets.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete_provider_secret(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<bool, StoreError> {
        Ok(self
            .secrets
            .write()
            .await
            .remove(&(user_id, provider))
            .is_some())
    }

    async fn insert_usage(&self, r: NewUsageRecord) -> Result<(), StoreError> {
        self.usage.write().await.push(UsageRecord {
            id: Uuid::new_v4(),
            model_id: r.model_id,
            user_id: r.user_id,
            input_tokens: r.input_tokens,
            output_tokens: r.output_tokens,
            estimated_cost: r.estimated_cost,
            latency_ms: r.latency_ms,
            tool_rounds: r.tool_rounds,
            round_limit_reached: r.round_limit_reached,
            is_error: r.is_error,
            error_message: r.error_message,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_usage(
        &self,
        user_id: Uuid,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<UsageRecord>, i64), StoreError> {
        let usage = self.usage.read().await;
        let mut rows: Vec<&UsageRecord> =
            usage.iter().filter(|r| r.user_id == Some(user_id)).collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rows.len() as i64;
        let offset = ((page - 1).max(0) * per_page) as usize;
        let data = rows
            .into_iter()
            .skip(offset)
            .take(per_page.max(0) as usize)
            .cloned()
            .collect();

        Ok((data, total))
    }

    async fn cleanup_usage(&self, retention_days: u32) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let mut usage = self.usage.write().await;
        let before = usage.len();
        usage.retain(|r| r.created_at >= cutoff);
        Ok((before - usage.len()) as u64)
    }
}
