//! Process bootstrap for the parcel synchronization engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use parcel_sync::application::SyncEngine;
use parcel_sync::domain::sync::{ParcelSource, ParcelStore, SearchSink};
use parcel_sync::infrastructure::config::AppConfig;
use parcel_sync::infrastructure::http_client::{HttpClient, HttpClientConfig};
use parcel_sync::infrastructure::logging::init_logging;
use parcel_sync::infrastructure::parcel_repository::SqliteParcelRepository;
use parcel_sync::infrastructure::search_index::ElasticSearchSink;
use parcel_sync::infrastructure::source_client::GraphqlSourceClient;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "parcel-sync.json".to_string());
    let config = AppConfig::load_or_init(&config_path).await?;

    init_logging(&config.logging)?;
    info!("Starting parcel-sync with config from {config_path}");

    let repository = SqliteParcelRepository::connect(&config.database.url)
        .await
        .context("Failed to open row store")?;
    repository.migrate().await.context("Migration failed")?;

    let http = HttpClient::new(HttpClientConfig::default())?;
    let source = GraphqlSourceClient::new(
        http,
        config.source.api_url.clone(),
        config.source.metadata_base_url.clone(),
    );

    let sink = ElasticSearchSink::new(&config.search)?;
    sink.ensure_index()
        .await
        .context("Failed to prepare search index")?;

    let engine = SyncEngine::new(
        Arc::new(source) as Arc<dyn ParcelSource>,
        Arc::new(repository) as Arc<dyn ParcelStore>,
        Arc::new(sink) as Arc<dyn SearchSink>,
        &config,
    );

    engine.start().await;
    if !engine.is_ready().await {
        // Startup probes will report not-ready; keep the process up so the
        // failure is observable through them rather than a crash loop.
        info!("Engine is not ready; steady-state loops were not started");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, exiting");
    Ok(())
}
