use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::error::AppError;
use crate::llm::{ChatOptions, Message, StreamOptions, TextStream, ToolCallHandler, ToolDefinition};
use crate::models::Caller;
use crate::services::usage_service;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub model_id: Uuid,
    pub messages: Vec<Message>,
    /// Caller-defined tools. Calls to these are returned, not executed.
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    /// Offer the built-in tools and execute their calls server-side.
    #[serde(default)]
    pub enable_tools: bool,
    pub max_tool_rounds: Option<u32>,
}

/// POST /api/chat: one completion, or an SSE stream with `stream: true`
async fn chat(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<ChatRequest>,
) -> Result<Response, AppError> {
    if body.messages.is_empty() {
        return Err(AppError::BadRequest("messages must not be empty".into()));
    }

    if body.stream {
        let options = StreamOptions {
            temperature: body.temperature,
            max_tokens: body.max_tokens,
            user_id: caller.user_id,
            cancel: None,
        };
        let text = state.client.stream(body.model_id, body.messages, options).await?;
        return Ok(sse_response(text));
    }

    let mut tools = body.tools;
    let tool_handler = if body.enable_tools {
        tools.extend(state.tools.definitions());
        Some(state.tools.clone() as Arc<dyn ToolCallHandler>)
    } else {
        None
    };
    let options = ChatOptions {
        tools,
        temperature: body.temperature,
        max_tokens: body.max_tokens,
        user_id: caller.user_id,
        tool_handler,
        max_tool_rounds: body.max_tool_rounds,
        cancel: None,
    };

    let start = Instant::now();
    let outcome = state
        .client
        .chat(body.model_id, body.messages, options)
        .await;
    usage_service::record_chat(
        state.store.as_ref(),
        body.model_id,
        caller.user_id,
        &outcome,
        start.elapsed(),
    )
    .await;

    Ok(Json(outcome?).into_response())
}

/// `data: {"content": …}` per fragment, then `data: [DONE]`. A failure
/// mid-stream is sent as an `error` event and ends the stream.
fn sse_response(text: TextStream) -> Response {
    let events = async_stream::stream! {
        let mut text = text;
        let mut failed = false;
        while let Some(item) = text.next().await {
            match item {
                Ok(chunk) => {
                    yield Ok::<Event, Infallible>(
                        Event::default().data(json!({ "content": chunk }).to_string()),
                    );
                }
                Err(e) => {
                    let (_, message) = AppError::from(e).status_and_message();
                    yield Ok(Event::default()
                        .event("error")
                        .data(json!({ "message": message }).to_string()));
                    failed = true;
                    break;
                }
            }
        }
        if !failed {
            yield Ok(Event::default().data("[DONE]"));
        }
    };

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat))
}
