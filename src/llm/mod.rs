//! Provider abstraction: neutral chat types, one adapter per provider family,
//! HTTP transport and the unified client on top.

pub mod adapter;
pub mod anthropic;
pub mod client;
pub mod error;
pub mod framing;
pub mod huggingface;
pub mod ollama;
pub mod openai;
pub mod transport;
pub mod types;

pub use adapter::{Adapter, ProviderAdapter, StreamFraming};
pub use client::{ChatOptions, ClientError, StreamOptions, ToolCallHandler, UnifiedClient};
pub use error::{LlmError, ParseError, ToolExecutionError};
pub use transport::ProviderTransport;
pub use types::{
    FinishReason, LlmResponse, Message, RequestParams, ResponseMetadata, Role, Termination,
    TextStream, ToolCall, ToolDefinition, Usage,
};
