use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ModelStore, StoreError};
use crate::models::{
    AuthType, ModelConfig, NewUsageRecord, ProviderKind, ProviderSecret, UsageRecord,
};

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ModelStore for PgStore {
    async fn list_models(&self, viewer: Option<Uuid>) -> Result<Vec<ModelConfig>, StoreError> {
        let rows = sqlx::query_as::<_, ModelRow>(
            r#"
            SELECT * FROM llm_models
            WHERE is_global = TRUE OR ($1::uuid IS NOT NULL AND owner_id = $1)
            ORDER BY is_global DESC, created_at DESC
            "#,
        )
        .bind(viewer)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ModelConfig::try_from).collect()
    }

    async fn get_model(
        &self,
        id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<Option<ModelConfig>, StoreError> {
        let row = sqlx::query_as::<_, ModelRow>(
            r#"
            SELECT * FROM llm_models
            WHERE id = $1 AND (is_global = TRUE OR ($2::uuid IS NOT NULL AND owner_id = $2))
            "#,
        )
        .bind(id)
        .bind(viewer)
        .fetch_optional(&self.db)
        .await?;

        row.map(ModelConfig::try_from).transpose()
    }

    async fn find_model(&self, id: Uuid) -> Result<Option<ModelConfig>, StoreError> {
        let row = sqlx::query_as::<_, ModelRow>("SELECT * FROM llm_models WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(ModelConfig::try_from).transpose()
    }

    async fn insert_model(&self, m: &ModelConfig) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO llm_models (
                id, owner_id, name, description, provider, base_url, model_identifier,
                auth_type, encrypted_api_key, api_key_preview, auth_headers,
                supports_streaming, supports_functions, supports_vision,
                context_length, max_output_tokens, temperature, top_p,
                price_per_input_token, price_per_output_token,
                enabled, is_global, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
            )
            "#,
        )
        .bind(m.id)
        .bind(m.owner_id)
        .bind(&m.name)
        .bind(&m.description)
        .bind(m.provider.as_str())
        .bind(&m.base_url)
        .bind(&m.model_identifier)
        .bind(m.auth_type.as_str())
        .bind(&m.encrypted_api_key)
        .bind(&m.api_key_preview)
        .bind(m.auth_headers.clone().map(Json))
        .bind(m.supports_streaming)
        .bind(m.supports_functions)
        .bind(m.supports_vision)
        .bind(m.context_length)
        .bind(m.max_output_tokens)
        .bind(m.temperature)
        .bind(m.top_p)
        .bind(m.price_per_input_token)
        .bind(m.price_per_output_token)
        .bind(m.enabled)
        .bind(m.is_global)
        .bind(m.created_at)
        .bind(m.updated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn update_model(&self, m: &ModelConfig) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE llm_models
            SET name = $1, description = $2, provider = $3, base_url = $4,
                model_identifier = $5, auth_type = $6, encrypted_api_key = $7,
                api_key_preview = $8, auth_headers = $9, supports_streaming = $10,
                supports_functions = $11, supports_vision = $12, context_length = $13,
                max_output_tokens = $14, temperature = $15, top_p = $16,
                price_per_input_token = $17, price_per_output_token = $18,
                enabled = $19, updated_at = $20
            WHERE id = $21
            "#,
        )
        .bind(&m.name)
        .bind(&m.description)
        .bind(m.provider.as_str())
        .bind(&m.base_url)
        .bind(&m.model_identifier)
        .bind(m.auth_type.as_str())
        .bind(&m.encrypted_api_key)
        .bind(&m.api_key_preview)
        .bind(m.auth_headers.clone().map(Json))
        .bind(m.supports_streaming)
        .bind(m.supports_functions)
        .bind(m.supports_vision)
        .bind(m.context_length)
        .bind(m.max_output_tokens)
        .bind(m.temperature)
        .bind(m.top_p)
        .bind(m.price_per_input_token)
        .bind(m.price_per_output_token)
        .bind(m.enabled)
        .bind(m.updated_at)
        .bind(m.id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn delete_model(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM llm_models WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_provider_secret(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<Option<ProviderSecret>, StoreError> {
        let row = sqlx::query_as::<_, SecretRow>(
            "SELECT * FROM provider_secrets WHERE user_id = $1 AND provider = $2",
        )
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(&self.db)
        .await?;

        row.map(ProviderSecret::try_from).transpose()
    }

    async fn list_provider_secrets(&self, user_id: Uuid) -> Result<Vec<ProviderSecret>, StoreError> {
        let rows = sqlx::query_as::<_, SecretRow>(
            "SELECT * FROM provider_secrets WHERE user_id = $1 ORDER BY provider",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(ProviderSecret::try_from).collect()
    }

    async fn upsert_provider_secret(
        &self,
        s: &ProviderSecret,
    ) -> Result<ProviderSecret, StoreError> {
        let row = sqlx::query_as::<_, SecretRow>(
            r#"
            INSERT INTO provider_secrets
                (user_id, provider, encrypted_api_key, api_key_preview, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (user_id, provider) DO UPDATE SET
                encrypted_api_key = EXCLUDED.encrypted_api_key,
                api_key_preview = EXCLUDED.api_key_preview,
                description = EXCLUDED.description,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(s.user_id)
        .bind(s.provider.as_str())
        .bind(&s.encrypted_api_key)
        .bind(&s.api_key_preview)
        .bind(&s.description)
        .bind(s.updated_at)
        .fetch_one(&self.db)
        .await?;

        ProviderSecret::try_from(row)
    }

    async fn delete_provider_secret(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM provider_secrets WHERE user_id = $1 AND provider = $2")
                .bind(user_id)
                .bind(provider.as_str())
                .execute(&self.db)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_usage(&self, r: NewUsageRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO llm_usage_logs (
                id, model_id, user_id, input_tokens, output_tokens, estimated_cost,
                latency_ms, tool_rounds, round_limit_reached, is_error, error_message, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(r.model_id)
        .bind(r.user_id)
        .bind(r.input_tokens)
        .bind(r.output_tokens)
        .bind(r.estimated_cost)
        .bind(r.latency_ms)
        .bind(r.tool_rounds)
        .bind(r.round_limit_reached)
        .bind(r.is_error)
        .bind(&r.error_message)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn list_usage(
        &self,
        user_id: Uuid,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<UsageRecord>, i64), StoreError> {
        let offset = (page - 1).max(0) * per_page;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM llm_usage_logs WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT * FROM llm_usage_logs
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok((rows.into_iter().map(UsageRecord::from).collect(), total))
    }

    async fn cleanup_usage(&self, retention_days: u32) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM llm_usage_logs WHERE created_at < NOW() - make_interval(days => $1)",
        )
        .bind(retention_days as i32)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

// ── Row types ─────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct ModelRow {
    id: Uuid,
    owner_id: Option<Uuid>,
    name: String,
    description: Option<String>,
    provider: String,
    base_url: String,
    model_identifier: String,
    auth_type: String,
    encrypted_api_key: Option<String>,
    api_key_preview: Option<String>,
    auth_headers: Option<Json<HashMap<String, String>>>,
    supports_streaming: bool,
    supports_functions: bool,
    supports_vision: bool,
    context_length: i32,
    max_output_tokens: Option<i32>,
    temperature: Option<f64>,
    top_p: Option<f64>,
    price_per_input_token: Option<f64>,
    price_per_output_token: Option<f64>,
    enabled: bool,
    is_global: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ModelRow> for ModelConfig {
    type Error = StoreError;

    fn try_from(r: ModelRow) -> Result<Self, Self::Error> {
        let provider = r
            .provider
            .parse::<ProviderKind>()
            .map_err(|e| StoreError::Corrupt(format!("llm_models {}: {e}", r.id)))?;
        let auth_type = r
            .auth_type
            .parse::<AuthType>()
            .map_err(|e| StoreError::Corrupt(format!("llm_models {}: {e}", r.id)))?;

        Ok(ModelConfig {
            id: r.id,
            owner_id: r.owner_id,
            name: r.name,
            description: r.description,
            provider,
            base_url: r.base_url,
            model_identifier: r.model_identifier,
            auth_type,
            encrypted_api_key: r.encrypted_api_key,
            api_key_preview: r.api_key_preview,
            auth_headers: r.auth_headers.map(|Json(h)| h),
            supports_streaming: r.supports_streaming,
            supports_functions: r.supports_functions,
            supports_vision: r.supports_vision,
            context_length: r.context_length,
            max_output_tokens: r.max_output_tokens,
            temperature: r.temperature,
            top_p: r.top_p,
            price_per_input_token: r.price_per_input_token,
            price_per_output_token: r.price_per_output_token,
            enabled: r.enabled,
            is_global: r.is_global,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SecretRow {
    user_id: Uuid,
    provider: String,
    encrypted_api_key: String,
    api_key_preview: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SecretRow> for ProviderSecret {
    type Error = StoreError;

    fn try_from(r: SecretRow) -> Result<Self, Self::Error> {
        let provider = r.provider.parse::<ProviderKind>().map_err(|e| {
            StoreError::Corrupt(format!("provider_secrets for {}: {e}", r.user_id))
        })?;

        Ok(ProviderSecret {
            user_id: r.user_id,
            provider,
            encrypted_api_key: r.encrypted_api_key,
            api_key_preview: r.api_key_preview,
            description: r.description,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    id: Uuid,
    model_id: Uuid,
    user_id: Option<Uuid>,
    input_tokens: Option<i32>,
    output_tokens: Option<i32>,
    estimated_cost: Option<f64>,
    latency_ms: i32,
    tool_rounds: i32,
    round_limit_reached: bool,
    is_error: bool,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<UsageRow> for UsageRecord {
    fn from(r: UsageRow) -> Self {
        Self {
            id: r.id,
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
            created_at: r.created_at,
        }
    }
}
