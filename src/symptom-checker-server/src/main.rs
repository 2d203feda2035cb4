// Copyright (c), Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use std::sync::Arc;
use symptom_checker_server::app::{router, HttpModelClient, QueryStore};
use symptom_checker_server::config::AppConfig;
use symptom_checker_server::AppState;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Entry point of the symptom checker server.
///
/// # Environment Variables
/// - `BIND_ADDR` / `PORT`: listen address (default: "0.0.0.0:8000")
/// - `LLM_PROVIDER`: `google`, `openai` or `anthropic` (default: "google")
/// - `GOOGLE_API_KEY` / `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`: provider credential
/// - `LLM_MODEL`: primary candidate model
/// - `STUB_MODE`, `HEURISTIC_FALLBACK`, `ALLOW_CLIENT_API_KEY`, `ENABLE_PERSISTENCE`: flags
/// - `DATABASE_URL`: SQLite location for the query log
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("symptom_checker_server=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    info!(
        "-- Starting symptom checker on {} (provider: {}, configured: {}, stub mode: {})",
        config.bind_addr,
        config.provider,
        config.llm_configured(),
        config.stub_mode
    );
    if !config.llm_configured() && !config.stub_mode {
        warn!(
            "{} is not set; requests will use the heuristic fallback unless clients supply a key",
            config.provider.key_var()
        );
    }

    let store = if config.persistence_enabled {
        match QueryStore::open(&config.database_url) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                error!("Query store unavailable, continuing without persistence: {}", e);
                None
            }
        }
    } else {
        None
    };

    let model = Arc::new(HttpModelClient::from_config(&config)?);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    let state = Arc::new(AppState::new(config, model, store));

    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;

    Ok(())
}
