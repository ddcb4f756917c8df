//! Unified LLM client: the one entry point the rest of the service uses to
//! talk to any configured model.

use std::sync::Arc;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::adapter::{Adapter, ProviderAdapter};
use super::error::{LlmError, ToolExecutionError};
use super::transport::ProviderTransport;
use super::types::{
    LlmResponse, Message, RequestParams, ResponseMetadata, Termination, TextStream, ToolCall,
    ToolDefinition, Usage,
};
use crate::models::{ModelConfig, ResolvedModel};
use crate::services::model_service::{ModelRegistry, RegistryError};

/// Executes tool calls requested by the model.
#[async_trait]
pub trait ToolCallHandler: Send + Sync {
    async fn handle(&self, call: &ToolCall) -> Result<String, ToolExecutionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Provider(#[from] LlmError),
}

#[derive(Clone, Default)]
pub struct ChatOptions {
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    /// Used for credential resolution and visibility.
    pub user_id: Option<Uuid>,
    /// Without a handler, tool calls are returned to the caller as-is.
    pub tool_handler: Option<Arc<dyn ToolCallHandler>>,
    /// Lowers the client's configured round limit for this call. Values
    /// above the configured limit are clamped to it.
    pub max_tool_rounds: Option<u32>,
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub user_id: Option<Uuid>,
    pub cancel: Option<CancellationToken>,
}

pub struct UnifiedClient {
    registry: Arc<ModelRegistry>,
    transport: ProviderTransport,
    max_tool_rounds: u32,
}

impl UnifiedClient {
    pub fn new(registry: Arc<ModelRegistry>, transport: ProviderTransport, max_tool_rounds: u32) -> Self {
        Self {
            registry,
            transport,
            max_tool_rounds,
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Send a conversation and run the tool loop until the model answers
    /// without tool calls or the round limit is hit.
    ///
    /// Transport failures propagate immediately; there is no retry here.
    pub async fn chat(
        &self,
        model_id: Uuid,
        messages: Vec<Message>,
        options: ChatOptions,
    ) -> Result<LlmResponse, ClientError> {
        let run = async {
            let target = self.registry.get_model_config(model_id, options.user_id).await?;
            self.run_tool_loop(&target, messages, &options).await
        };

        match &options.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(LlmError::Cancelled.into()),
                result = run => result,
            },
            None => run.await,
        }
    }

    async fn run_tool_loop(
        &self,
        target: &ResolvedModel,
        mut messages: Vec<Message>,
        options: &ChatOptions,
    ) -> Result<LlmResponse, ClientError> {
        let config = &target.config;
        let adapter = Adapter::for_provider(config.provider);
        let params = RequestParams::for_model(config, options.temperature, options.max_tokens, false);
        let max_rounds = options
            .max_tool_rounds
            .map_or(self.max_tool_rounds, |n| n.min(self.max_tool_rounds));

        let tools: &[ToolDefinition] = if config.supports_functions && adapter.supports_tools() {
            &options.tools
        } else {
            if !options.tools.is_empty() {
                tracing::debug!(model_id = %config.id, "Model does not take tools, dropping definitions");
            }
            &[]
        };

        let mut rounds = 0u32;
        let mut usage: Option<Usage> = None;

        loop {
            let mut response = self
                .transport
                .complete(target, adapter, &messages, tools, &params)
                .await?;
            usage = Usage::combine(usage, response.usage);

            let handler = match &options.tool_handler {
                Some(handler) if !response.tool_calls.is_empty() => handler,
                _ => return Ok(finish(response, config, usage, rounds, Termination::Completed)),
            };

            if rounds >= max_rounds {
                tracing::warn!(
                    model_id = %config.id,
                    rounds,
                    "Tool round limit reached, returning last response"
                );
                return Ok(finish(response, config, usage, rounds, Termination::RoundLimitReached));
            }

            rounds += 1;
            tracing::debug!(
                model_id = %config.id,
                round = rounds,
                calls = response.tool_calls.len(),
                "Executing tool calls"
            );

            let results = execute_tool_calls(handler.as_ref(), &response.tool_calls).await;
            let calls = std::mem::take(&mut response.tool_calls);
            let call_ids: Vec<String> = calls.iter().map(|c| c.id.clone()).collect();
            messages.push(Message::assistant_tool_calls(response.content, calls));
            for (id, result) in call_ids.into_iter().zip(results) {
                messages.push(Message::tool_result(id, result));
            }
        }
    }

    /// Stream text fragments. Providers or models without streaming support
    /// get one chunk holding the full `chat` answer.
    pub async fn stream(
        &self,
        model_id: Uuid,
        messages: Vec<Message>,
        options: StreamOptions,
    ) -> Result<TextStream, ClientError> {
        let target = self.registry.get_model_config(model_id, options.user_id).await?;
        let adapter = Adapter::for_provider(target.config.provider);

        if !(adapter.supports_streaming() && target.config.supports_streaming) {
            tracing::debug!(
                model_id = %model_id,
                provider = %target.config.provider,
                "Streaming unsupported, falling back to a single chunk"
            );
            return Ok(Box::pin(single_chunk(
                self.transport.clone(),
                target,
                adapter,
                messages,
                options,
            )));
        }

        let params = RequestParams::for_model(
            &target.config,
            options.temperature,
            options.max_tokens,
            true,
        );
        let open = self
            .transport
            .open_stream(&target, adapter, &messages, &params, options.cancel.clone());

        let stream = match &options.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(LlmError::Cancelled.into()),
                opened = open => opened?,
            },
            None => open.await?,
        };
        Ok(stream)
    }
}

fn finish(
    mut response: LlmResponse,
    config: &ModelConfig,
    usage: Option<Usage>,
    rounds: u32,
    termination: Termination,
) -> LlmResponse {
    response.usage = usage;
    response.metadata = ResponseMetadata {
        tool_rounds: rounds,
        termination,
        round_limit_reached: termination == Termination::RoundLimitReached,
        estimated_cost: usage.and_then(|u| config.estimate_cost(u.input_tokens, u.output_tokens)),
    };
    response
}

/// Run every call of one round concurrently. Results come back in request
/// order; failures become text the model can react to.
async fn execute_tool_calls(handler: &dyn ToolCallHandler, calls: &[ToolCall]) -> Vec<String> {
    let futures = calls.iter().map(|call| async move {
        match handler.handle(call).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool execution failed");
                format!("Tool execution failed: {e}")
            }
        }
    });
    join_all(futures).await
}

/// Lazy one-item stream backed by a non-streaming request.
fn single_chunk(
    transport: ProviderTransport,
    target: ResolvedModel,
    adapter: Adapter,
    messages: Vec<Message>,
    options: StreamOptions,
) -> impl futures::Stream<Item = Result<String, LlmError>> + Send {
    try_stream! {
        let params = RequestParams::for_model(
            &target.config,
            options.temperature,
            options.max_tokens,
            false,
        );
        let request = transport.complete(&target, adapter, &messages, &[], &params);
        let response = match &options.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                response = request => Some(response),
            },
            None => Some(request.await),
        };
        if let Some(response) = response {
            yield response?.content;
        }
    }
}
