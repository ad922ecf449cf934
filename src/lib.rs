//! Parcel Sync - Land Parcel Synchronization Engine
//!
//! Mirrors an append/update-only on-chain land-parcel dataset (exposed through
//! a paginated query API) into a local SQLite row store and a search index.
//! The pipeline runs a one-time bounded-concurrency bulk load, then a
//! steady-state loop: either an incremental poll against the source or a
//! best-effort metadata enrichment backfill.

// Module declarations
pub mod domain;
pub mod infrastructure;
pub mod application;

// Re-export the engine surface for the hosting process
pub use application::sync_engine::SyncEngine;
pub use infrastructure::config::AppConfig;
