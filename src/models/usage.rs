use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Full row for a usage log entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: Uuid,
    pub model_id: Uuid,
    pub user_id: Option<Uuid>,
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub estimated_cost: Option<f64>,
    pub latency_ms: i32,
    pub tool_rounds: i32,
    pub round_limit_reached: bool,
    pub is_error: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a new usage entry (built by the chat route).
#[derive(Debug, Clone)]
pub struct NewUsageRecord {
    pub model_id: Uuid,
    pub user_id: Option<Uuid>,
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub estimated_cost: Option<f64>,
    pub latency_ms: i32,
    pub tool_rounds: i32,
    pub round_limit_reached: bool,
    pub is_error: bool,
    pub error_message: Option<String>,
}

/// Paginated response wrapper for usage listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageListResponse {
    pub data: Vec<UsageRecord>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}
