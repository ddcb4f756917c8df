pub mod caller;
pub mod model_config;
pub mod provider_secret;
pub mod resolved;
pub mod usage;

pub use caller::Caller;
pub use model_config::{AuthType, CreateModel, ModelConfig, ModelInfo, ProviderKind, UpdateModel};
pub use provider_secret::{ProviderSecret, ProviderSecretInfo, UpsertProviderSecret};
pub use resolved::{ResolvedModel, SecretKey};
pub use usage::{NewUsageRecord, UsageListResponse, UsageRecord};
