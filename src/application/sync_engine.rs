//! Synchronization engine: startup orchestration and readiness
//!
//! Owns the pipeline state (readiness flag + cursor) in one place instead of
//! ambient mutable variables. `start()` runs the bulk load to completion;
//! failure halts the pipeline with readiness false. Success marks the engine
//! ready and launches exactly one steady-state loop: the enrichment backfill
//! (default, matching the service this engine replaces) or the incremental
//! poll, selected by configuration.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info};

use crate::application::backfiller::Backfiller;
use crate::application::bulk_loader::BulkLoader;
use crate::application::poller::Poller;
use crate::domain::cursor::CursorValue;
use crate::domain::sync::{ParcelSource, ParcelStore, SearchSink};
use crate::infrastructure::config::{AppConfig, SteadyState};

/// Pipeline state owned by the engine. `ready` is written once, by the bulk
/// loader success path; `cursor` mirrors the last persisted watermark.
#[derive(Debug, Default, Clone, Copy)]
struct EngineState {
    ready: bool,
    cursor: CursorValue,
}

pub struct SyncEngine {
    bulk_loader: BulkLoader,
    poller: Poller,
    backfiller: Backfiller,
    steady_state: SteadyState,
    state: Arc<RwLock<EngineState>>,
}

impl SyncEngine {
    pub fn new(
        source: Arc<dyn ParcelSource>,
        store: Arc<dyn ParcelStore>,
        sink: Arc<dyn SearchSink>,
        config: &AppConfig,
    ) -> Self {
        let bulk_loader = BulkLoader::new(
            Arc::clone(&source),
            Arc::clone(&store),
            config.source.batch_size,
            config.source.concurrency,
        );
        let poller = Poller::new(
            Arc::clone(&source),
            Arc::clone(&store),
            Arc::clone(&sink),
            config.source.batch_size,
            config.engine.refresh_interval(),
            config.engine.cursor_advance,
        );
        let backfiller = Backfiller::new(source, store, sink);

        Self {
            bulk_loader,
            poller,
            backfiller,
            steady_state: config.engine.steady_state,
            state: Arc::new(RwLock::new(EngineState::default())),
        }
    }

    /// Run the bulk load, then hand steady state to the configured loop.
    ///
    /// A bulk-load failure is fatal to startup but not to the process: it is
    /// logged, readiness stays false and no loop is launched.
    pub async fn start(&self) {
        match self.bulk_loader.run().await {
            Ok(outcome) => {
                {
                    let mut state = self.state.write().await;
                    state.ready = true;
                    state.cursor = outcome.terminal_cursor;
                }
                info!(
                    "Initial sync done at cursor {} (skipped: {})",
                    outcome.terminal_cursor, outcome.skipped
                );

                match self.steady_state {
                    SteadyState::Enrichment => {
                        let backfiller = self.backfiller.clone();
                        tokio::spawn(async move {
                            backfiller.run().await;
                        });
                    }
                    SteadyState::Poll => {
                        let poller = self.poller.clone();
                        let cursor = outcome.terminal_cursor;
                        tokio::spawn(async move {
                            poller.run(cursor).await;
                        });
                    }
                }
            }
            Err(e) => {
                error!("Poll halt! Initial sync faced issues: {e}");
            }
        }
    }

    /// Ready once the bulk load has completed successfully in this process
    /// lifetime. Never re-evaluated against the steady-state loops.
    pub async fn is_ready(&self) -> bool {
        self.state.read().await.ready
    }

    pub async fn startup_probe(&self) -> bool {
        self.is_ready().await
    }

    pub async fn readiness_probe(&self) -> bool {
        self.is_ready().await
    }

    /// Last watermark observed by the engine at startup.
    pub async fn cursor(&self) -> CursorValue {
        self.state.read().await.cursor
    }
}
