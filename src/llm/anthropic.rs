//! Anthropic Messages API.
//!
//! Differences from the OpenAI shape: the system prompt is a top-level field,
//! tool calls are `tool_use` content blocks and tool results travel back as
//! `tool_result` blocks inside a user turn.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::adapter::{error_message, join_url, ProviderAdapter};
use super::error::ParseError;
use super::types::{
    FinishReason, LlmResponse, Message, RequestParams, Role, ToolCall, ToolDefinition, Usage,
};
use crate::models::ModelConfig;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory for Anthropic.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn endpoint(&self, config: &ModelConfig, _stream: bool) -> String {
        let base = config.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            join_url(base, "messages")
        } else {
            join_url(base, "v1/messages")
        }
    }

    fn format_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &RequestParams<'_>,
    ) -> Value {
        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut body = Map::new();
        body.insert("model".into(), json!(params.model));
        body.insert(
            "max_tokens".into(),
            json!(params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
        );
        if !system.is_empty() {
            body.insert("system".into(), json!(system.join("\n\n")));
        }
        body.insert("messages".into(), Value::Array(to_wire_messages(messages)));
        if !tools.is_empty() {
            let wire: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body.insert("tools".into(), Value::Array(wire));
        }
        if let Some(t) = params.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(p) = params.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if params.stream {
            body.insert("stream".into(), json!(true));
        }
        Value::Object(body)
    }

    fn parse_response(&self, raw: &Value) -> Result<LlmResponse, ParseError> {
        if let Some(message) = error_message(raw) {
            return Err(ParseError::new(format!("provider error: {message}")));
        }

        let response = Response::deserialize(raw)?;
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text } => content.push_str(&text),
                ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input,
                }),
                ContentBlock::Other => {}
            }
        }

        Ok(LlmResponse {
            content,
            tool_calls,
            usage: response.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
            finish_reason: response
                .stop_reason
                .as_deref()
                .map(FinishReason::from_provider),
            ..Default::default()
        })
    }

    fn parse_stream_chunk(&self, payload: &str) -> Result<Option<String>, ParseError> {
        let event: Value = serde_json::from_str(payload)?;
        match event.get("type").and_then(Value::as_str) {
            Some("content_block_delta") => Ok(event
                .pointer("/delta/text")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)),
            Some("error") => Err(ParseError::new(format!(
                "provider error: {}",
                error_message(&event).unwrap_or_else(|| "unknown".into())
            ))),
            _ => Ok(None),
        }
    }

    fn is_stream_end(&self, payload: &str) -> bool {
        serde_json::from_str::<Value>(payload)
            .ok()
            .and_then(|v| v.get("type").and_then(Value::as_str).map(|t| t == "message_stop"))
            .unwrap_or(false)
    }

    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[("anthropic-version", ANTHROPIC_VERSION)]
    }
}

/// Neutral turns to Anthropic turns. System turns are dropped here (they go
/// to the top-level field) and consecutive tool results are merged into one
/// user turn.
fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
    let mut wire: Vec<Value> = Vec::new();
    for msg in messages {
        match msg.role {
            Role::System => {}
            Role::User => wire.push(json!({ "role": "user", "content": msg.content })),
            Role::Assistant if msg.tool_calls.is_empty() => {
                wire.push(json!({ "role": "assistant", "content": msg.content }))
            }
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(json!({ "type": "text", "text": msg.content }));
                }
                for tc in &msg.tool_calls {
                    let input = if tc.arguments.is_object() {
                        tc.arguments.clone()
                    } else {
                        json!({})
                    };
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": input,
                    }));
                }
                wire.push(json!({ "role": "assistant", "content": blocks }));
            }
            Role::Tool => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id.as_deref().unwrap_or_default(),
                    "content": msg.content,
                });
                let merged = wire
                    .last_mut()
                    .filter(|last| last["role"] == "user")
                    .and_then(|last| last["content"].as_array_mut());
                match merged {
                    Some(blocks) => blocks.push(block),
                    None => wire.push(json!({ "role": "user", "content": [block] })),
                }
            }
        }
    }
    wire
}

// --- Response types ---

#[derive(Deserialize)]
struct Response {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ResponseUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;

    fn params() -> RequestParams<'static> {
        RequestParams {
            model: "claude-3-5-haiku-latest",
            temperature: None,
            top_p: None,
            max_tokens: None,
            stream: false,
        }
    }

    #[test]
    fn system_prompt_moves_to_top_level() {
        let messages = vec![Message::system("Be terse."), Message::user("hello")];
        let body = AnthropicAdapter.format_request(&messages, &[], &params());
        assert_eq!(body["system"], "Be terse.");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(
            body["messages"],
            json!([{ "role": "user", "content": "hello" }])
        );
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn tool_round_trip_uses_content_blocks() {
        let call = ToolCall {
            id: "toolu_1".into(),
            name: "calculator".into(),
            arguments: json!({ "expression": "2*3" }),
        };
        let second = ToolCall {
            id: "toolu_2".into(),
            ..call.clone()
        };
        let messages = vec![
            Message::user("compute"),
            Message::assistant_tool_calls("Let me check.", vec![call, second]),
            Message::tool_result("toolu_1", "6"),
            Message::tool_result("toolu_2", "6"),
        ];
        let tools = vec![ToolDefinition {
            name: "calculator".into(),
            description: "math".into(),
            parameters: json!({ "type": "object" }),
        }];
        let body = AnthropicAdapter.format_request(&messages, &tools, &params());
        let wire = body["messages"].as_array().unwrap();
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1]["content"][1]["type"], "tool_use");
        assert_eq!(wire[1]["content"][1]["input"]["expression"], "2*3");
        assert_eq!(wire[2]["role"], "user");
        assert_eq!(wire[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(wire[2]["content"][1]["tool_use_id"], "toolu_2");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn parses_text_and_tool_use() {
        let raw = json!({
            "id": "msg_1",
            "type": "message",
            "content": [
                { "type": "text", "text": "Checking." },
                { "type": "tool_use", "id": "toolu_1", "name": "calculator", "input": { "expression": "1+1" } }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 12, "output_tokens": 7 }
        });
        let resp = AnthropicAdapter.parse_response(&raw).unwrap();
        assert_eq!(resp.content, "Checking.");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(resp.usage.unwrap().output_tokens, 7);
    }

    #[test]
    fn error_payloads_are_parse_errors() {
        let raw = json!({ "type": "error", "error": { "type": "overloaded_error", "message": "Overloaded" } });
        assert!(AnthropicAdapter
            .parse_response(&raw)
            .unwrap_err()
            .0
            .contains("Overloaded"));
    }

    #[test]
    fn stream_events() {
        let delta = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#;
        assert_eq!(
            AnthropicAdapter.parse_stream_chunk(delta).unwrap().as_deref(),
            Some("Hi")
        );
        let start = r#"{"type":"message_start","message":{}}"#;
        assert_eq!(AnthropicAdapter.parse_stream_chunk(start).unwrap(), None);
        assert!(AnthropicAdapter.is_stream_end(r#"{"type":"message_stop"}"#));
        assert!(!AnthropicAdapter.is_stream_end(start));
        let err = r#"{"type":"error","error":{"message":"Overloaded"}}"#;
        assert!(AnthropicAdapter.parse_stream_chunk(err).is_err());
    }

    #[test]
    fn endpoint_accepts_base_with_or_without_version() {
        let with = ModelConfig::for_test(ProviderKind::Anthropic, "https://api.anthropic.com/v1", "c");
        let without = ModelConfig::for_test(ProviderKind::Anthropic, "https://api.anthropic.com", "c");
        assert_eq!(
            AnthropicAdapter.endpoint(&with, false),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            AnthropicAdapter.endpoint(&without, true),
            "https://api.anthropic.com/v1/messages"
        );
    }
}
