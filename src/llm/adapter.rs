//! Shared adapter interface and the closed set of provider adapters.

use serde_json::Value;

use super::anthropic::AnthropicAdapter;
use super::error::ParseError;
use super::huggingface::HuggingFaceAdapter;
use super::ollama::OllamaAdapter;
use super::openai::OpenAiAdapter;
use super::types::{LlmResponse, Message, RequestParams, ToolDefinition};
use crate::models::{ModelConfig, ProviderKind};

/// How a provider frames its streaming body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFraming {
    /// `data: …` lines, one JSON payload per event.
    Sse,
    /// One JSON object per line.
    Ndjson,
}

/// Translation between the neutral chat types and one vendor's wire format.
///
/// Adapters are pure: they never perform I/O. The transport sends what
/// `format_request` builds to `endpoint` and feeds the replies back through
/// `parse_response` / `parse_stream_chunk`.
pub trait ProviderAdapter {
    fn endpoint(&self, config: &ModelConfig, stream: bool) -> String;

    fn format_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &RequestParams<'_>,
    ) -> Value;

    fn parse_response(&self, raw: &Value) -> Result<LlmResponse, ParseError>;

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_tools(&self) -> bool {
        true
    }

    fn stream_framing(&self) -> StreamFraming {
        StreamFraming::Sse
    }

    /// Text carried by one stream payload, or `None` for control frames.
    fn parse_stream_chunk(&self, _payload: &str) -> Result<Option<String>, ParseError> {
        Ok(None)
    }

    /// Whether this payload is the provider's end-of-stream marker.
    fn is_stream_end(&self, _payload: &str) -> bool {
        false
    }

    /// Header carrying the key for `AuthType::ApiKey`.
    fn api_key_header(&self) -> &'static str {
        "x-api-key"
    }

    /// Fixed headers every request needs.
    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }
}

/// Every supported adapter. New providers are added as a variant here plus
/// their own module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    OpenAi(OpenAiAdapter),
    Anthropic(AnthropicAdapter),
    Ollama(OllamaAdapter),
    HuggingFace(HuggingFaceAdapter),
}

impl Adapter {
    pub fn for_provider(provider: ProviderKind) -> Self {
        match provider {
            ProviderKind::OpenAI | ProviderKind::Custom => Adapter::OpenAi(OpenAiAdapter::standard()),
            ProviderKind::Azure => Adapter::OpenAi(OpenAiAdapter::azure()),
            ProviderKind::Anthropic => Adapter::Anthropic(AnthropicAdapter),
            ProviderKind::Ollama => Adapter::Ollama(OllamaAdapter),
            ProviderKind::HuggingFace => Adapter::HuggingFace(HuggingFaceAdapter),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $a:ident => $call:expr) => {
        match $self {
            Adapter::OpenAi($a) => $call,
            Adapter::Anthropic($a) => $call,
            Adapter::Ollama($a) => $call,
            Adapter::HuggingFace($a) => $call,
        }
    };
}

impl ProviderAdapter for Adapter {
    fn endpoint(&self, config: &ModelConfig, stream: bool) -> String {
        dispatch!(self, a => a.endpoint(config, stream))
    }

    fn format_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &RequestParams<'_>,
    ) -> Value {
        dispatch!(self, a => a.format_request(messages, tools, params))
    }

    fn parse_response(&self, raw: &Value) -> Result<LlmResponse, ParseError> {
        dispatch!(self, a => a.parse_response(raw))
    }

    fn supports_streaming(&self) -> bool {
        dispatch!(self, a => a.supports_streaming())
    }

    fn supports_tools(&self) -> bool {
        dispatch!(self, a => a.supports_tools())
    }

    fn stream_framing(&self) -> StreamFraming {
        dispatch!(self, a => a.stream_framing())
    }

    fn parse_stream_chunk(&self, payload: &str) -> Result<Option<String>, ParseError> {
        dispatch!(self, a => a.parse_stream_chunk(payload))
    }

    fn is_stream_end(&self, payload: &str) -> bool {
        dispatch!(self, a => a.is_stream_end(payload))
    }

    fn api_key_header(&self) -> &'static str {
        dispatch!(self, a => a.api_key_header())
    }

    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        dispatch!(self, a => a.default_headers())
    }
}

/// Join a base URL and a path without doubling or dropping the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Provider error payloads come in a few shapes; pull out the message.
pub(crate) fn error_message(raw: &Value) -> Option<String> {
    match raw.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(Value::Object(obj.clone()).to_string())),
        other if !other.is_null() => Some(other.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn providers_map_to_adapters() {
        assert!(matches!(
            Adapter::for_provider(ProviderKind::Custom),
            Adapter::OpenAi(_)
        ));
        assert!(matches!(
            Adapter::for_provider(ProviderKind::Azure),
            Adapter::OpenAi(a) if a == OpenAiAdapter::azure()
        ));
        assert!(!Adapter::for_provider(ProviderKind::HuggingFace).supports_streaming());
        assert_eq!(
            Adapter::for_provider(ProviderKind::Ollama).stream_framing(),
            StreamFraming::Ndjson
        );
    }

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://x/v1/", "/chat"), "http://x/v1/chat");
        assert_eq!(join_url("http://x/v1", "chat"), "http://x/v1/chat");
    }

    #[test]
    fn error_message_reads_common_shapes() {
        assert_eq!(
            error_message(&json!({"error": {"message": "bad"}})).as_deref(),
            Some("bad")
        );
        assert_eq!(
            error_message(&json!({"error": "loading"})).as_deref(),
            Some("loading")
        );
        assert_eq!(error_message(&json!({"choices": []})), None);
    }
}
