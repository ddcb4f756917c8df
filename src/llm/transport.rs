//! HTTP dispatch towards providers: auth application, status handling and
//! stream decoding. One pooled `reqwest::Client` is shared by every request.

use std::time::Duration;

use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::adapter::{Adapter, ProviderAdapter};
use super::error::LlmError;
use super::framing::FrameDecoder;
use super::types::{LlmResponse, Message, RequestParams, TextStream, ToolDefinition};
use crate::models::{AuthType, ProviderKind, ResolvedModel};

/// Placeholder replaced by the resolved key inside custom auth header values.
const API_KEY_PLACEHOLDER: &str = "{api_key}";

#[derive(Debug, Clone)]
pub struct ProviderTransport {
    http: reqwest::Client,
    timeout: Duration,
}

impl ProviderTransport {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// Send one non-streaming request and parse the reply.
    pub async fn complete(
        &self,
        target: &ResolvedModel,
        adapter: Adapter,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &RequestParams<'_>,
    ) -> Result<LlmResponse, LlmError> {
        let provider = target.config.provider;
        let url = adapter.endpoint(&target.config, false);
        let body = adapter.format_request(messages, tools, params);

        tracing::debug!(%provider, model = params.model, "Sending provider request");
        let response = self
            .request(target, adapter, &url, &body)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        if !(200..300).contains(&status) {
            tracing::warn!(%provider, status, "Provider returned an error status");
            return Err(LlmError::api(status, &text));
        }

        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::parse(provider, status, format!("invalid JSON: {e}"), &text))?;
        adapter
            .parse_response(&raw)
            .map_err(|e| LlmError::parse(provider, status, e.0, &text))
    }

    /// Open a streaming request. Errors before the first byte (connect, auth,
    /// bad status) are returned directly; later ones end the stream.
    pub async fn open_stream(
        &self,
        target: &ResolvedModel,
        adapter: Adapter,
        messages: &[Message],
        params: &RequestParams<'_>,
        cancel: Option<CancellationToken>,
    ) -> Result<TextStream, LlmError> {
        let provider = target.config.provider;
        let url = adapter.endpoint(&target.config, true);
        let body = adapter.format_request(messages, &[], params);

        tracing::debug!(%provider, model = params.model, "Opening provider stream");
        // Only the wait for headers is bounded; a long-running body is fine.
        let send = self.request(target, adapter, &url, &body).send();
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| {
                tracing::warn!(%provider, timeout = ?self.timeout, "Provider stream did not open in time");
                LlmError::Timeout(self.timeout)
            })??;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(%provider, status, "Provider rejected stream request");
            return Err(LlmError::api(status, &text));
        }

        Ok(Box::pin(decode_stream(response, adapter, provider, cancel)))
    }

    fn request(
        &self,
        target: &ResolvedModel,
        adapter: Adapter,
        url: &str,
        body: &Value,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .json(body);

        for (name, value) in adapter.default_headers() {
            req = req.header(*name, *value);
        }
        apply_auth(req, target, adapter)
    }
}

/// Attach the resolved credential the way the model's `auth_type` asks for,
/// then any configured extra headers.
fn apply_auth(
    mut req: reqwest::RequestBuilder,
    target: &ResolvedModel,
    adapter: Adapter,
) -> reqwest::RequestBuilder {
    let key = target.api_key.as_ref().map(|k| k.expose());

    match (target.config.auth_type, key) {
        (AuthType::Bearer, Some(key)) => req = req.bearer_auth(key),
        (AuthType::ApiKey, Some(key)) => req = req.header(adapter.api_key_header(), key),
        _ => {}
    }

    if let Some(headers) = &target.config.auth_headers {
        for (name, value) in headers {
            if !value.contains(API_KEY_PLACEHOLDER) {
                req = req.header(name.as_str(), value.as_str());
            } else if let Some(key) = key {
                req = req.header(name.as_str(), value.replace(API_KEY_PLACEHOLDER, key));
            }
        }
    }
    req
}

/// Turn a provider body into text fragments. Ends on the provider's end
/// marker, on end of body or when `cancel` fires; a parse or transport error
/// is yielded once and ends the stream.
fn decode_stream(
    response: reqwest::Response,
    adapter: Adapter,
    provider: ProviderKind,
    cancel: Option<CancellationToken>,
) -> impl Stream<Item = Result<String, LlmError>> + Send {
    try_stream! {
        let status = response.status().as_u16();
        let mut bytes = std::pin::pin!(response.bytes_stream());
        let mut decoder = FrameDecoder::new(adapter.stream_framing());
        let mut finished = false;

        while !finished {
            let next = match &cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::debug!(%provider, "Stream cancelled by caller");
                        None
                    }
                    item = bytes.next() => item,
                },
                None => bytes.next().await,
            };

            let payloads = match next {
                Some(chunk) => {
                    let chunk: Bytes = chunk.map_err(LlmError::Transport)?;
                    decoder
                        .push(&chunk)
                        .map_err(|e| LlmError::parse(provider, status, e.0, ""))?
                }
                None if cancel.as_ref().is_some_and(|t| t.is_cancelled()) => break,
                None => {
                    finished = true;
                    decoder.finish().into_iter().collect()
                }
            };

            for payload in payloads {
                let text = adapter
                    .parse_stream_chunk(&payload)
                    .map_err(|e| LlmError::parse(provider, status, e.0, &payload))?;
                if let Some(text) = text {
                    yield text;
                }
                if adapter.is_stream_end(&payload) {
                    finished = true;
                    break;
                }
            }
        }
    }
}
