pub mod config_cache;
pub mod credential_service;
pub mod model_service;
pub mod secret_service;
pub mod usage_service;
