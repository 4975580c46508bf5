//! psybrief API server
//!
//! Run with: cargo run -p psybrief-web --bin psybrief

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use psybrief_db::{MemoryStore, PgStore, StudyStore};
use psybrief_ingestion::{Capability, NormalisationRules, PubMedClient};
use psybrief_llm::LlmBackend;
use psybrief_web::config::{secret_from_env, Config};
use psybrief_web::state::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,psybrief=debug")),
        )
        .init();

    info!("Starting psybrief API server...");
    let config = Config::load()?;

    // Store
    let database_url = config
        .database
        .url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());
    let store: Arc<dyn StudyStore> = match database_url {
        Some(url) => {
            let store = PgStore::connect(&url, config.database.max_connections)
                .await
                .context("connecting to PostgreSQL")?;
            info!("Using PostgreSQL store");
            Arc::new(store)
        }
        None => {
            warn!("No database URL configured; studies are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    // Model backend
    let backend = config.llm.build_backend()?;
    info!(backend = ?config.llm.backend, model = %config.llm.model, local = backend.is_local(), "LLM backend ready");
    let mut capability = Capability::new(backend)
        .with_model(config.llm.model.clone())
        .with_temperature(config.llm.temperature);
    if let Some(max_tokens) = config.llm.max_tokens {
        capability = capability.with_max_tokens(max_tokens);
    }

    let rules = Arc::new(
        NormalisationRules::compile(config.normalisation.clone())
            .context("compiling normalisation tables")?,
    );

    let feed = Arc::new(PubMedClient::new(
        config.pubmed.search_params(),
        secret_from_env(&config.pubmed.api_key_env),
    ));

    let state = AppState::new(capability, store, rules, feed, config.ingestion.max_concurrency);
    let app = psybrief_web::router::build_router(state);

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid server.bind address: {}", config.server.bind))?;
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
