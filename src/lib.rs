//! Unified access to LLM providers: a model registry with encrypted
//! credentials, provider adapters and one client API over all of them.

pub mod config;
pub mod crypto;
pub mod error;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod tools;

pub use crypto::EncryptionService;
pub use llm::{ChatOptions, LlmResponse, Message, StreamOptions, UnifiedClient};
pub use services::model_service::{ModelRegistry, RegistryError};
pub use store::{MemoryStore, ModelStore, PgStore};
