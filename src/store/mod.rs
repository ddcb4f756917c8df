//! Persistence for model configs, provider secrets and usage logs.
//!
//! Implementations enforce row visibility themselves: a viewer sees global
//! models plus the models it owns, never another user's private models.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{ModelConfig, NewUsageRecord, ProviderKind, ProviderSecret, UsageRecord};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// A stored row could not be mapped back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Global models plus models owned by `viewer`, including disabled ones.
    async fn list_models(&self, viewer: Option<Uuid>) -> Result<Vec<ModelConfig>, StoreError>;

    /// Fetch a single model if it is visible to `viewer`.
    async fn get_model(
        &self,
        id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Option<ModelConfig>, StoreError>;

    /// Fetch a model regardless of visibility. Only used for ownership checks
    /// on mutation.
    async fn find_model(&self, id: Uuid) -> Result<Option<ModelConfig>, StoreError>;

    async fn insert_model(&self, model: &ModelConfig) -> Result<(), StoreError>;

    async fn update_model(&self, model: &ModelConfig) -> Result<(), StoreError>;

    /// Returns `false` when no row was deleted.
    async fn delete_model(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn get_provider_secret(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<Option<ProviderSecret>, StoreError>;

    async fn list_provider_secrets(&self, user_id: Uuid) -> Result<Vec<ProviderSecret>, StoreError>;

    /// Insert or replace the secret for `(user_id, provider)`. The original
    /// `created_at` survives a replace.
    async fn upsert_provider_secret(
        &self,
        secret: &ProviderSecret,
    ) -> Result<ProviderSecret, StoreError>;

    async fn delete_provider_secret(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<bool, StoreError>;

    async fn insert_usage(&self, record: NewUsageRecord) -> Result<(), StoreError>;

    /// Newest first. Returns the page and the total row count for `user_id`.
    async fn list_usage(
        &self,
        user_id: Uuid,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<UsageRecord>, i64), StoreError>;

    /// Delete usage rows older than `retention_days`. Returns rows deleted.
    async fn cleanup_usage(&self, retention_days: u32) -> Result<u64, StoreError>;
}
