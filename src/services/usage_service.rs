use std::time::Duration;

use uuid::Uuid;

use crate::llm::{ClientError, LlmResponse};
use crate::models::{NewUsageRecord, UsageListResponse};
use crate::store::{ModelStore, StoreError};

const MAX_PER_PAGE: i64 = 100;

/// Log one non-streaming chat call. Failures to write are logged and
/// swallowed so they never fail the chat request itself.
pub async fn record_chat(
    store: &dyn ModelStore,
    model_id: Uuid,
    user_id: Option<Uuid>,
    outcome: &Result<LlmResponse, ClientError>,
    elapsed: Duration,
) {
    let latency_ms = i32::try_from(elapsed.as_millis()).unwrap_or(i32::MAX);
    let record = match outcome {
        Ok(response) => NewUsageRecord {
            model_id,
            user_id,
            input_tokens: response.usage.map(|u| clamp_tokens(u.input_tokens)),
            output_tokens: response.usage.map(|u| clamp_tokens(u.output_tokens)),
            estimated_cost: response.metadata.estimated_cost,
            latency_ms,
            tool_rounds: clamp_tokens(response.metadata.tool_rounds),
            round_limit_reached: response.metadata.round_limit_reached,
            is_error: false,
            error_message: None,
        },
        Err(e) => NewUsageRecord {
            model_id,
            user_id,
            input_tokens: None,
            output_tokens: None,
            estimated_cost: None,
            latency_ms,
            tool_rounds: 0,
            round_limit_reached: false,
            is_error: true,
            error_message: Some(e.to_string()),
        },
    };

    if let Err(e) = store.insert_usage(record).await {
        tracing::error!(model_id = %model_id, "Failed to record usage: {}", e);
    }
}

fn clamp_tokens(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Offset-based pagination, newest first. `page` starts at 1.
pub async fn list_usage(
    store: &dyn ModelStore,
    user_id: Uuid,
    page: i64,
    per_page: i64,
) -> Result<UsageListResponse, StoreError> {
    let page = page.max(1);
    let per_page = per_page.clamp(1, MAX_PER_PAGE);
    let (data, total) = store.list_usage(user_id, page, per_page).await?;
    Ok(UsageListResponse {
        data,
        total,
        page,
        per_page,
    })
}

/// Delete usage rows older than `retention_days` days.
pub async fn cleanup_old_usage(store: &dyn ModelStore, retention_days: u32) -> Result<u64, StoreError> {
    store.cleanup_usage(retention_days).await
}
