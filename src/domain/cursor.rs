//! Synchronization cursor types
//!
//! A cursor is an opaque, monotonically advancing watermark for one entity
//! kind. The bulk loader writes an id-based cursor; the incremental poller
//! writes a timestamp-based one. The enrichment backfiller never writes it.

use serde::{Deserialize, Serialize};

/// Ordering value persisted per entity kind (one row in `sync_cursors`).
/// Either the highest parcel id seen during bulk load or the highest
/// source-side update timestamp seen while polling. Zero is the "never
/// synced" sentinel.
pub type CursorValue = i64;

/// Cursor row key for the parcel entity kind.
pub const PARCEL_CURSOR_KIND: &str = "land_token";

/// Policy for advancing the poll cursor after a non-empty fetch.
///
/// The upstream service this engine replaces advanced the cursor to the
/// *pre-fetch* boundary value, which re-fetches the same records on every
/// subsequent poll. That behavior is kept selectable until product confirms
/// the intent; `MaxObserved` advances to the highest timestamp in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorAdvance {
    PreFetchBoundary,
    MaxObserved,
}

impl Default for CursorAdvance {
    fn default() -> Self {
        Self::PreFetchBoundary
    }
}
