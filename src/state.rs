use std::sync::Arc;

use crate::config::Config;
use crate::crypto::EncryptionService;
use crate::llm::{ProviderTransport, UnifiedClient};
use crate::services::config_cache::ConfigCache;
use crate::services::model_service::ModelRegistry;
use crate::store::ModelStore;
use crate::tools::ToolRegistry;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ModelStore>,
    pub crypto: Arc<EncryptionService>,
    /// Shared with the registry so secret changes can invalidate it.
    pub cache: Arc<ConfigCache>,
    pub registry: Arc<ModelRegistry>,
    pub client: UnifiedClient,
    pub tools: Arc<ToolRegistry>,
}

impl AppState {
    pub fn build(config: Config, store: Arc<dyn ModelStore>) -> Self {
        let crypto = Arc::new(EncryptionService::from_key_material(&config.encryption_key));
        let cache = Arc::new(ConfigCache::new(
            config.config_cache_ttl(),
            config.config_cache_capacity,
        ));
        let transport = ProviderTransport::new(reqwest::Client::new(), config.provider_timeout());
        let registry = Arc::new(ModelRegistry::new(
            store.clone(),
            crypto.clone(),
            cache.clone(),
            transport.clone(),
        ));
        let client = UnifiedClient::new(registry.clone(), transport, config.max_tool_rounds);

        Self {
            config,
            store,
            crypto,
            cache,
            registry,
            client,
            tools: Arc::new(ToolRegistry),
        }
    }
}
