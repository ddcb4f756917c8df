use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL. Without one the service runs on the in-memory store.
    pub database_url: Option<String>,
    /// 64 hex chars (raw AES-256 key) or a passphrase.
    pub encryption_key: String,
    pub admin_key: String,
    pub listen_addr: String,
    /// Comma-separated list of allowed CORS origins, or "*" for any.
    pub cors_origin: String,
    pub max_tool_rounds: u32,
    /// 0 disables the resolved-config cache.
    pub config_cache_ttl_secs: u64,
    pub config_cache_capacity: usize,
    pub provider_timeout_secs: u64,
    /// Number of days to retain usage logs. 0 = keep forever.
    pub usage_retention_days: u32,
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn required_env(key: &str) -> anyhow::Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{key} is required"))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            encryption_key: required_env("ENCRYPTION_KEY")?,
            admin_key: required_env("ADMIN_KEY")?,
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            cors_origin: env::var("CORS_ORIGIN").unwrap_or_else(|_| "*".into()),
            max_tool_rounds: parse_env("MAX_TOOL_ROUNDS", 5),
            config_cache_ttl_secs: parse_env("CONFIG_CACHE_TTL_SECS", 300),
            config_cache_capacity: parse_env("CONFIG_CACHE_CAPACITY", 1024),
            provider_timeout_secs: parse_env("PROVIDER_TIMEOUT_SECS", 120),
            usage_retention_days: parse_env("USAGE_RETENTION_DAYS", 30),
        })
    }

    pub fn config_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config_cache_ttl_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

#[cfg(test)]
impl Config {
    /// In-memory config for route tests.
    pub(crate) fn for_test() -> Self {
        Self {
            database_url: None,
            encryption_key: "route test encryption key".into(),
            admin_key: "test-admin-key".into(),
            listen_addr: "127.0.0.1:0".into(),
            cors_origin: "*".into(),
            max_tool_rounds: 5,
            config_cache_ttl_secs: 300,
            config_cache_capacity: 64,
            provider_timeout_secs: 5,
            usage_retention_days: 30,
        }
    }
}
