//! OpenAI chat-completions format. Also serves Azure OpenAI and custom
//! OpenAI-compatible endpoints (vLLM, LM Studio, OpenRouter, …).

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::adapter::{error_message, join_url, ProviderAdapter};
use super::error::ParseError;
use super::types::{
    FinishReason, LlmResponse, Message, RequestParams, Role, ToolCall, ToolDefinition, Usage,
};
use crate::models::ModelConfig;

const AZURE_API_VERSION: &str = "2024-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenAiAdapter {
    azure: bool,
}

impl OpenAiAdapter {
    pub fn standard() -> Self {
        Self { azure: false }
    }

    pub fn azure() -> Self {
        Self { azure: true }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn endpoint(&self, config: &ModelConfig, _stream: bool) -> String {
        let (base, query) = match config.base_url.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (config.base_url.as_str(), None),
        };
        let url = join_url(base, "chat/completions");
        match query {
            Some(query) => format!("{url}?{query}"),
            None if self.azure => format!("{url}?api-version={AZURE_API_VERSION}"),
            None => url,
        }
    }

    fn format_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &RequestParams<'_>,
    ) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(params.model));
        body.insert(
            "messages".into(),
            Value::Array(messages.iter().map(to_wire_message).collect()),
        );
        if !tools.is_empty() {
            body.insert("tools".into(), tools_to_wire(tools));
        }
        if let Some(t) = params.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(p) = params.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if let Some(m) = params.max_tokens {
            body.insert("max_tokens".into(), json!(m));
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

        let completion = Completion::deserialize(raw)?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ParseError::new("response has no choices"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: parse_arguments(&tc.function.arguments),
            })
            .collect();

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: completion.usage.and_then(WireUsage::normalise),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::from_provider),
            ..Default::default()
        })
    }

    fn parse_stream_chunk(&self, payload: &str) -> Result<Option<String>, ParseError> {
        if payload == "[DONE]" {
            return Ok(None);
        }
        let raw: Value = serde_json::from_str(payload)?;
        if let Some(message) = error_message(&raw) {
            return Err(ParseError::new(format!("provider error: {message}")));
        }
        let text = raw
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Ok(text)
    }

    fn is_stream_end(&self, payload: &str) -> bool {
        payload == "[DONE]"
    }

    fn api_key_header(&self) -> &'static str {
        if self.azure {
            "api-key"
        } else {
            "x-api-key"
        }
    }
}

fn to_wire_message(msg: &Message) -> Value {
    match msg.role {
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = if msg.content.is_empty() {
                Value::Null
            } else {
                json!(msg.content)
            };
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or_default(),
            "content": msg.content,
        }),
        role => json!({ "role": role.as_str(), "content": msg.content }),
    }
}

/// OpenAI's `tools` array; Ollama accepts the same shape.
pub(crate) fn tools_to_wire(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect(),
    )
}

/// Arguments arrive as a JSON-encoded string. Keep the raw string when the
/// model produced invalid JSON so the tool handler can report it.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// --- Response types ---

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

impl WireUsage {
    fn normalise(self) -> Option<Usage> {
        if self.prompt_tokens.is_none() && self.completion_tokens.is_none() {
            return None;
        }
        Some(Usage {
            input_tokens: self.prompt_tokens.unwrap_or(0),
            output_tokens: self.completion_tokens.unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;

    fn config(base_url: &str) -> ModelConfig {
        ModelConfig::for_test(ProviderKind::Azure, base_url, "gpt-4o-mini")
    }

    fn params(stream: bool) -> RequestParams<'static> {
        RequestParams {
            model: "gpt-4o-mini",
            temperature: None,
            top_p: None,
            max_tokens: None,
            stream,
        }
    }

    #[test]
    fn minimal_request_has_only_model_and_messages() {
        let body =
            OpenAiAdapter::standard().format_request(&[Message::user("2+2?")], &[], &params(false));
        assert_eq!(
            body,
            json!({"model": "gpt-4o-mini", "messages": [{"role": "user", "content": "2+2?"}]})
        );
    }

    #[test]
    fn request_carries_tools_and_sampling() {
        let tools = vec![ToolDefinition {
            name: "calculator".into(),
            description: "math".into(),
            parameters: json!({"type": "object"}),
        }];
        let p = RequestParams {
            temperature: Some(0.5),
            max_tokens: Some(64),
            ..params(true)
        };
        let body = OpenAiAdapter::standard().format_request(&[Message::user("hi")], &tools, &p);
        assert_eq!(body["tools"][0]["function"]["name"], "calculator");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn tool_turns_use_openai_shapes() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "calculator".into(),
            arguments: json!({"expression": "1+1"}),
        };
        let messages = vec![
            Message::assistant_tool_calls("", vec![call]),
            Message::tool_result("call_1", "2"),
        ];
        let body = OpenAiAdapter::standard().format_request(&messages, &[], &params(false));
        let wire = &body["messages"];
        assert_eq!(wire[0]["content"], Value::Null);
        assert_eq!(
            wire[0]["tool_calls"][0]["function"]["arguments"],
            r#"{"expression":"1+1"}"#
        );
        assert_eq!(wire[1]["tool_call_id"], "call_1");
    }

    #[test]
    fn parses_scenario_response() {
        let raw = json!({
            "choices": [{"message": {"content": "4"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1}
        });
        let resp = OpenAiAdapter::standard().parse_response(&raw).unwrap();
        assert_eq!(resp.content, "4");
        assert_eq!(
            resp.usage,
            Some(Usage {
                input_tokens: 5,
                output_tokens: 1
            })
        );
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.finish_reason, None);
    }

    #[test]
    fn parses_tool_calls() {
        let raw = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "calculator", "arguments": "{\"expression\":\"6*7\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let resp = OpenAiAdapter::standard().parse_response(&raw).unwrap();
        assert_eq!(resp.content, "");
        assert_eq!(resp.tool_calls[0].arguments, json!({"expression": "6*7"}));
        assert_eq!(resp.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(resp.usage, None);
    }

    #[test]
    fn malformed_responses_are_parse_errors() {
        let adapter = OpenAiAdapter::standard();
        assert!(adapter.parse_response(&json!({"choices": []})).is_err());
        assert!(adapter.parse_response(&json!({"result": "4"})).is_err());
        let err = adapter
            .parse_response(&json!({"error": {"message": "model overloaded"}}))
            .unwrap_err();
        assert!(err.0.contains("model overloaded"));
    }

    #[test]
    fn stream_chunks() {
        let adapter = OpenAiAdapter::standard();
        assert_eq!(
            adapter
                .parse_stream_chunk(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#)
                .unwrap()
                .as_deref(),
            Some("Hel")
        );
        assert_eq!(
            adapter
                .parse_stream_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#)
                .unwrap(),
            None
        );
        assert_eq!(adapter.parse_stream_chunk("[DONE]").unwrap(), None);
        assert!(adapter.is_stream_end("[DONE]"));
        assert!(adapter.parse_stream_chunk("{not json").is_err());
    }

    #[test]
    fn azure_endpoint_and_key_header() {
        let adapter = OpenAiAdapter::azure();
        let cfg = config("https://res.openai.azure.com/openai/deployments/gpt4o/");
        assert_eq!(
            adapter.endpoint(&cfg, false),
            "https://res.openai.azure.com/openai/deployments/gpt4o/chat/completions?api-version=2024-06-01"
        );
        assert_eq!(adapter.api_key_header(), "api-key");
        assert_eq!(
            adapter.endpoint(&config("https://res.openai.azure.com/openai/deployments/x?api-version=2025-01-01"), false),
            "https://res.openai.azure.com/openai/deployments/x/chat/completions?api-version=2025-01-01"
        );
        assert_eq!(
            OpenAiAdapter::standard().endpoint(&config("https://api.openai.com/v1"), true),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
