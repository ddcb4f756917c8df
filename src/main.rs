use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use unified_llm_gateway::config::Config;
use unified_llm_gateway::services::usage_service;
use unified_llm_gateway::state::AppState;
use unified_llm_gateway::store::{MemoryStore, ModelStore, PgStore};
use unified_llm_gateway::routes;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if missing)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!("Starting unified LLM gateway on {}", config.listen_addr);

    let store: Arc<dyn ModelStore> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            tracing::info!("Database migrations applied");
            Arc::new(PgStore::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let state = Arc::new(AppState::build(config.clone(), store));
    tracing::info!(
        key_fingerprint = state.crypto.key_fingerprint(),
        "Encryption key loaded"
    );

    // Spawn background usage retention task
    if config.usage_retention_days > 0 {
        let retention_store = state.store.clone();
        let retention_days = config.usage_retention_days;
        tokio::spawn(async move {
            // Run cleanup once on startup, then every hour
            loop {
                match usage_service::cleanup_old_usage(retention_store.as_ref(), retention_days).await {
                    Ok(n) if n > 0 => {
                        tracing::info!(
                            "Cleaned up {} usage records older than {} days",
                            n,
                            retention_days
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Usage cleanup error: {}", e);
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            }
        });
    }

    let app = routes::app(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("Listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
