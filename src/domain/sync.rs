//! Trait seams and error taxonomy for the synchronization pipeline
//!
//! The engine talks to its three collaborators through these traits only:
//! the paginated remote source, the durable row store and the search sink.
//! Concrete adapters live in the infrastructure layer; tests substitute
//! in-memory fakes.

use async_trait::async_trait;

use crate::domain::cursor::CursorValue;
use crate::domain::parcel::{Parcel, ParcelDocument, ParcelFragment};

/// Pipeline error taxonomy. What the caller does with each variant differs:
/// a bulk-load `Fetch` failure is fatal to startup, while poll and
/// enrichment failures are logged and the loops continue.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("source fetch failed: {0}")]
    Fetch(#[source] anyhow::Error),

    #[error("row store operation failed: {0}")]
    Store(#[source] anyhow::Error),

    #[error("search index operation failed: {0}")]
    Index(#[source] anyhow::Error),
}

impl SyncError {
    pub fn fetch(err: impl Into<anyhow::Error>) -> Self {
        Self::Fetch(err.into())
    }

    pub fn store(err: impl Into<anyhow::Error>) -> Self {
        Self::Store(err.into())
    }

    pub fn index(err: impl Into<anyhow::Error>) -> Self {
        Self::Index(err.into())
    }
}

/// Remote paginated query capability.
#[async_trait]
pub trait ParcelSource: Send + Sync {
    /// Fetch one bulk-load page: `page_size` rows at offset
    /// `page * page_size`, restricted to ids greater than `id_gt` when set,
    /// ordered ascending by id.
    async fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
        id_gt: Option<CursorValue>,
    ) -> Result<Vec<ParcelFragment>, SyncError>;

    /// Fetch parcels whose source-side update timestamp exceeds `after`,
    /// ordered ascending by that timestamp, at most `page_size` rows.
    async fn fetch_changed_since(
        &self,
        after: CursorValue,
        page_size: u32,
    ) -> Result<Vec<ParcelFragment>, SyncError>;

    /// Fetch raw token-URI metadata for one parcel.
    async fn fetch_metadata(&self, id: i64) -> Result<String, SyncError>;
}

/// Durable row store: parcel rows plus one sync cursor per entity kind.
#[async_trait]
pub trait ParcelStore: Send + Sync {
    async fn get_cursor(&self, kind: &str) -> Result<Option<CursorValue>, SyncError>;

    async fn set_cursor(&self, kind: &str, value: CursorValue) -> Result<(), SyncError>;

    /// Upsert rows by id, preserving any previously enriched metadata.
    async fn upsert_parcels(&self, rows: &[ParcelFragment]) -> Result<(), SyncError>;

    /// Fire-and-forget insert used mid-round by the bulk loader. Write
    /// ordering is only guaranteed relative to round boundaries, not between
    /// pages of the same round.
    fn insert_parcels_unordered(&self, rows: Vec<ParcelFragment>);

    /// Parcels that have not been enriched yet, ascending by id.
    async fn find_missing_metadata(&self) -> Result<Vec<Parcel>, SyncError>;

    /// Attach raw metadata content to one parcel row.
    async fn set_metadata(&self, id: i64, raw: &str) -> Result<(), SyncError>;
}

/// Search sink: idempotent bulk upserts keyed by parcel id.
#[async_trait]
pub trait SearchSink: Send + Sync {
    async fn bulk_upsert(&self, documents: &[ParcelDocument]) -> Result<(), SyncError>;
}
