//! Ollama native chat API (`/api/chat`), streamed as NDJSON.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::adapter::{join_url, ProviderAdapter, StreamFraming};
use super::error::ParseError;
use super::openai::tools_to_wire;
use super::types::{
    FinishReason, LlmResponse, Message, RequestParams, Role, ToolCall, ToolDefinition, Usage,
};
use crate::models::ModelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OllamaAdapter;

impl ProviderAdapter for OllamaAdapter {
    /// Accepts the server root as well as the `/v1` or `/api` prefixes users
    /// tend to paste in.
    fn endpoint(&self, config: &ModelConfig, _stream: bool) -> String {
        let base = config.base_url.trim_end_matches('/');
        let root = base
            .strip_suffix("/v1")
            .or_else(|| base.strip_suffix("/api"))
            .unwrap_or(base);
        join_url(root, "api/chat")
    }

    fn format_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &RequestParams<'_>,
    ) -> Value {
        let wire: Vec<Value> = messages.iter().map(to_wire_message).collect();

        let mut options = Map::new();
        if let Some(t) = params.temperature {
            options.insert("temperature".into(), json!(t));
        }
        if let Some(p) = params.top_p {
            options.insert("top_p".into(), json!(p));
        }
        if let Some(m) = params.max_tokens {
            options.insert("num_predict".into(), json!(m));
        }

        // Ollama streams unless told otherwise.
        let mut body = json!({
            "model": params.model,
            "messages": wire,
            "stream": params.stream,
        });
        if !tools.is_empty() {
            body["tools"] = tools_to_wire(tools);
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }
        body
    }

    fn parse_response(&self, raw: &Value) -> Result<LlmResponse, ParseError> {
        if let Some(message) = raw.get("error").and_then(Value::as_str) {
            return Err(ParseError::new(format!("provider error: {message}")));
        }

        let reply = ChatReply::deserialize(raw)?;
        let tool_calls = reply
            .message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, tc)| ToolCall {
                id: tc.id.unwrap_or_else(|| format!("call_{i}")),
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        let usage = match (reply.prompt_eval_count, reply.eval_count) {
            (None, None) => None,
            (input, output) => Some(Usage {
                input_tokens: input.unwrap_or(0),
                output_tokens: output.unwrap_or(0),
            }),
        };

        Ok(LlmResponse {
            content: reply.message.content,
            tool_calls,
            usage,
            finish_reason: reply.done_reason.as_deref().map(FinishReason::from_provider),
            ..Default::default()
        })
    }

    fn stream_framing(&self) -> StreamFraming {
        StreamFraming::Ndjson
    }

    fn parse_stream_chunk(&self, payload: &str) -> Result<Option<String>, ParseError> {
        let line: Value = serde_json::from_str(payload)?;
        if let Some(message) = line.get("error").and_then(Value::as_str) {
            return Err(ParseError::new(format!("provider error: {message}")));
        }
        Ok(line
            .pointer("/message/content")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    fn is_stream_end(&self, payload: &str) -> bool {
        serde_json::from_str::<Value>(payload)
            .ok()
            .and_then(|v| v.get("done").and_then(Value::as_bool))
            .unwrap_or(false)
    }
}

fn to_wire_message(msg: &Message) -> Value {
    match msg.role {
        Role::Assistant if !msg.tool_calls.is_empty() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|tc| json!({ "function": { "name": tc.name, "arguments": tc.arguments } }))
                .collect();
            json!({ "role": "assistant", "content": msg.content, "tool_calls": calls })
        }
        role => json!({ "role": role.as_str(), "content": msg.content }),
    }
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatReply {
    message: ReplyMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ReplyToolCall>,
}

#[derive(Deserialize)]
struct ReplyToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ReplyFunction,
}

#[derive(Deserialize)]
struct ReplyFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;

    fn params(stream: bool) -> RequestParams<'static> {
        RequestParams {
            model: "llama3.2",
            temperature: Some(0.2),
            top_p: None,
            max_tokens: Some(100),
            stream,
        }
    }

    #[test]
    fn endpoint_normalises_base_url() {
        for base in [
            "http://localhost:11434",
            "http://localhost:11434/",
            "http://localhost:11434/v1",
            "http://localhost:11434/api",
        ] {
            let cfg = ModelConfig::for_test(ProviderKind::Ollama, base, "llama3.2");
            assert_eq!(
                OllamaAdapter.endpoint(&cfg, false),
                "http://localhost:11434/api/chat"
            );
        }
    }

    #[test]
    fn request_sets_stream_flag_and_options() {
        let body = OllamaAdapter.format_request(&[Message::user("hello")], &[], &params(false));
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["options"]["num_predict"], 100);
        assert_eq!(body["options"]["temperature"], 0.2);
    }

    #[test]
    fn parses_reply_with_tool_calls() {
        let raw = json!({
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{ "function": { "name": "calculator", "arguments": { "expression": "2+2" } } }]
            },
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 20,
            "eval_count": 4
        });
        let resp = OllamaAdapter.parse_response(&raw).unwrap();
        assert_eq!(resp.tool_calls[0].id, "call_0");
        assert_eq!(resp.tool_calls[0].arguments["expression"], "2+2");
        assert_eq!(
            resp.usage,
            Some(Usage {
                input_tokens: 20,
                output_tokens: 4
            })
        );
    }

    #[test]
    fn missing_counts_leave_usage_unreported() {
        let raw = json!({ "message": { "role": "assistant", "content": "hi" }, "done": true });
        assert_eq!(OllamaAdapter.parse_response(&raw).unwrap().usage, None);
        assert!(OllamaAdapter
            .parse_response(&json!({ "error": "model 'x' not found" }))
            .is_err());
    }

    #[test]
    fn ndjson_lines() {
        let line = r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#;
        assert_eq!(
            OllamaAdapter.parse_stream_chunk(line).unwrap().as_deref(),
            Some("Hel")
        );
        assert!(!OllamaAdapter.is_stream_end(line));
        let last = r#"{"message":{"role":"assistant","content":""},"done":true,"eval_count":3}"#;
        assert_eq!(OllamaAdapter.parse_stream_chunk(last).unwrap(), None);
        assert!(OllamaAdapter.is_stream_end(last));
    }
}
