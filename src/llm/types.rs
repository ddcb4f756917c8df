//! Provider-neutral chat types shared by every adapter.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use super::error::LlmError;
use crate::models::ModelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One conversation turn.
///
/// Assistant turns that requested tools carry `tool_calls`; tool results carry
/// the `tool_call_id` they answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::text(Role::Assistant, content)
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::text(Role::Tool, content)
        }
    }
}

/// A function the model may call. `parameters` is a JSON Schema object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    /// Sum two optional usages. Stays `None` only when neither side reported
    /// anything.
    pub fn combine(total: Option<Usage>, next: Option<Usage>) -> Option<Usage> {
        match (total, next) {
            (Some(a), Some(b)) => Some(Usage {
                input_tokens: a.input_tokens.saturating_add(b.input_tokens),
                output_tokens: a.output_tokens.saturating_add(b.output_tokens),
            }),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Normalise the vendor-specific stop reasons.
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "stop_sequence" | "eos_token" => FinishReason::Stop,
            "length" | "max_tokens" => FinishReason::Length,
            "tool_calls" | "tool_use" | "function_call" => FinishReason::ToolCalls,
            "content_filter" => FinishReason::ContentFilter,
            other => FinishReason::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Other(s) => s,
        }
    }
}

impl Serialize for FinishReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// How the tool-call loop ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    #[default]
    Completed,
    RoundLimitReached,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Tool-execution rounds performed before this response.
    pub tool_rounds: u32,
    pub termination: Termination,
    pub round_limit_reached: bool,
    /// From the model's per-token prices, when both usage and pricing exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

/// Normalized response, identical in shape for every provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// `None` when the provider did not report token counts.
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
    pub metadata: ResponseMetadata,
}

/// Per-request generation settings after merging caller overrides with the
/// model defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams<'a> {
    pub model: &'a str,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

impl<'a> RequestParams<'a> {
    pub fn for_model(
        config: &'a ModelConfig,
        temperature: Option<f64>,
        max_tokens: Option<u32>,
        stream: bool,
    ) -> Self {
        Self {
            model: &config.model_identifier,
            temperature: temperature.or(config.temperature),
            top_p: config.top_p,
            max_tokens: max_tokens
                .or_else(|| config.max_output_tokens.and_then(|t| u32::try_from(t).ok())),
            stream,
        }
    }
}

/// Lazy, finite sequence of text fragments. An `Err` item is terminal.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_accepts_plain_role_content() {
        let msg: Message = serde_json::from_str(r#"{"role":"user","content":"hello"}"#).unwrap();
        assert_eq!(msg, Message::user("hello"));
    }

    #[test]
    fn usage_combine_keeps_unreported_distinct() {
        let five = Some(Usage {
            input_tokens: 5,
            output_tokens: 1,
        });
        assert_eq!(Usage::combine(None, None), None);
        assert_eq!(Usage::combine(None, five), five);
        assert_eq!(
            Usage::combine(five, five),
            Some(Usage {
                input_tokens: 10,
                output_tokens: 2
            })
        );
    }

    #[test]
    fn finish_reasons_are_normalised() {
        assert_eq!(FinishReason::from_provider("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::from_provider("tool_use"), FinishReason::ToolCalls);
        assert_eq!(FinishReason::from_provider("max_tokens"), FinishReason::Length);
        assert_eq!(
            serde_json::to_value(FinishReason::Other("weird".into())).unwrap(),
            "weird"
        );
    }
}
