//! HuggingFace Inference API (text-generation task).
//!
//! There is no chat schema: the conversation is collapsed into one prompt
//! string. No streaming, no tool calling, no token counts.

use serde_json::{json, Map, Value};

use super::adapter::{error_message, join_url, ProviderAdapter};
use super::error::ParseError;
use super::types::{FinishReason, LlmResponse, Message, RequestParams, Role, ToolDefinition};
use crate::models::ModelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HuggingFaceAdapter;

impl ProviderAdapter for HuggingFaceAdapter {
    /// `base_url` may be the API root (`https://api-inference.huggingface.co`)
    /// or already point at a model or dedicated endpoint.
    fn endpoint(&self, config: &ModelConfig, _stream: bool) -> String {
        if config.base_url.contains("/models/") || config.base_url.contains(".endpoints.") {
            config.base_url.clone()
        } else {
            join_url(
                &config.base_url,
                &format!("models/{}", config.model_identifier),
            )
        }
    }

    fn format_request(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        params: &RequestParams<'_>,
    ) -> Value {
        let mut parameters = Map::new();
        parameters.insert("return_full_text".into(), json!(false));
        if let Some(m) = params.max_tokens {
            parameters.insert("max_new_tokens".into(), json!(m));
        }
        if let Some(t) = params.temperature {
            parameters.insert("temperature".into(), json!(t));
        }
        if let Some(p) = params.top_p {
            parameters.insert("top_p".into(), json!(p));
        }

        json!({
            "inputs": collapse_prompt(messages),
            "parameters": parameters,
        })
    }

    fn parse_response(&self, raw: &Value) -> Result<LlmResponse, ParseError> {
        if let Some(message) = error_message(raw) {
            return Err(ParseError::new(format!("provider error: {message}")));
        }

        let generation = match raw {
            Value::Array(items) => items
                .first()
                .ok_or_else(|| ParseError::new("empty generation list"))?,
            obj @ Value::Object(_) => obj,
            _ => return Err(ParseError::new("expected a generation object or list")),
        };
        let text = generation
            .get("generated_text")
            .and_then(Value::as_str)
            .ok_or_else(|| ParseError::new("missing generated_text"))?;

        Ok(LlmResponse {
            content: text.trim().to_string(),
            finish_reason: generation
                .pointer("/details/finish_reason")
                .and_then(Value::as_str)
                .map(FinishReason::from_provider),
            ..Default::default()
        })
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    fn supports_tools(&self) -> bool {
        false
    }
}

/// Role-labelled transcript ending in an open assistant turn.
fn collapse_prompt(messages: &[Message]) -> String {
    let mut prompt = String::new();
    for msg in messages {
        let label = match msg.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool result",
        };
        prompt.push_str(label);
        prompt.push_str(": ");
        prompt.push_str(&msg.content);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Assistant:");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProviderKind;

    fn params() -> RequestParams<'static> {
        RequestParams {
            model: "mistralai/Mistral-7B-Instruct-v0.3",
            temperature: None,
            top_p: None,
            max_tokens: Some(256),
            stream: false,
        }
    }

    #[test]
    fn conversation_collapses_into_one_prompt() {
        let messages = vec![Message::system("Be kind."), Message::user("hello")];
        let body = HuggingFaceAdapter.format_request(&messages, &[], &params());
        let prompt = body["inputs"].as_str().unwrap();
        assert_eq!(prompt, "System: Be kind.\n\nUser: hello\n\nAssistant:");
        assert_eq!(body["parameters"]["max_new_tokens"], 256);
        assert_eq!(body["parameters"]["return_full_text"], false);
    }

    #[test]
    fn parses_list_and_object_forms() {
        let list = json!([{ "generated_text": " Hi there " }]);
        let resp = HuggingFaceAdapter.parse_response(&list).unwrap();
        assert_eq!(resp.content, "Hi there");
        assert_eq!(resp.usage, None);

        let obj = json!({ "generated_text": "ok", "details": { "finish_reason": "eos_token" } });
        let resp = HuggingFaceAdapter.parse_response(&obj).unwrap();
        assert_eq!(resp.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn loading_and_junk_are_parse_errors() {
        let loading = json!({ "error": "Model is currently loading", "estimated_time": 20.0 });
        assert!(HuggingFaceAdapter.parse_response(&loading).is_err());
        assert!(HuggingFaceAdapter.parse_response(&json!([])).is_err());
        assert!(HuggingFaceAdapter.parse_response(&json!("text")).is_err());
    }

    #[test]
    fn endpoint_appends_model_path() {
        let cfg = ModelConfig::for_test(
            ProviderKind::HuggingFace,
            "https://api-inference.huggingface.co/",
            "gpt2",
        );
        assert_eq!(
            HuggingFaceAdapter.endpoint(&cfg, false),
            "https://api-inference.huggingface.co/models/gpt2"
        );
        let direct = ModelConfig::for_test(
            ProviderKind::HuggingFace,
            "https://api-inference.huggingface.co/models/gpt2",
            "gpt2",
        );
        assert_eq!(HuggingFaceAdapter.endpoint(&direct, false), direct.base_url);
    }
}
