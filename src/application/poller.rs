//! Incremental poll loop
//!
//! Steady-state single-flight loop: fetch parcels changed after the cursor,
//! persist them, push them to the search sink as one batch, sleep a fixed
//! interval, repeat forever. Failures are logged and swallowed; the next
//! iteration runs on the same interval with no backoff.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::cursor::{CursorAdvance, CursorValue, PARCEL_CURSOR_KIND};
use crate::domain::parcel::ParcelDocument;
use crate::domain::sync::{ParcelSource, ParcelStore, SearchSink, SyncError};

/// Result of one poll iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub next_cursor: CursorValue,
    pub rows_synced: usize,
}

#[derive(Clone)]
pub struct Poller {
    source: Arc<dyn ParcelSource>,
    store: Arc<dyn ParcelStore>,
    sink: Arc<dyn SearchSink>,
    batch_size: u32,
    refresh_interval: Duration,
    advance: CursorAdvance,
}

impl Poller {
    pub fn new(
        source: Arc<dyn ParcelSource>,
        store: Arc<dyn ParcelStore>,
        sink: Arc<dyn SearchSink>,
        batch_size: u32,
        refresh_interval: Duration,
        advance: CursorAdvance,
    ) -> Self {
        Self {
            source,
            store,
            sink,
            batch_size,
            refresh_interval,
            advance,
        }
    }

    /// One poll iteration against the given cursor.
    ///
    /// An empty page advances nothing and writes nothing. A non-empty page
    /// advances the persisted cursor per the configured [`CursorAdvance`]
    /// policy, upserts the rows and pushes one bulk batch to the sink.
    pub async fn poll_once(&self, after: CursorValue) -> Result<PollOutcome, SyncError> {
        debug!("Polling land token changes after {after}");
        let rows = self
            .source
            .fetch_changed_since(after, self.batch_size)
            .await?;

        if rows.is_empty() {
            return Ok(PollOutcome {
                next_cursor: after,
                rows_synced: 0,
            });
        }
        info!("Received {} land token(s) to be updated", rows.len());

        let next_cursor = match self.advance {
            CursorAdvance::PreFetchBoundary => after,
            CursorAdvance::MaxObserved => rows
                .iter()
                .filter_map(|row| row.timestamp)
                .max()
                .unwrap_or(after),
        };

        self.store
            .set_cursor(PARCEL_CURSOR_KIND, next_cursor)
            .await?;
        self.store.upsert_parcels(&rows).await?;

        let documents: Vec<ParcelDocument> = rows.iter().map(ParcelDocument::from).collect();
        self.sink.bulk_upsert(&documents).await?;

        Ok(PollOutcome {
            next_cursor,
            rows_synced: rows.len(),
        })
    }

    /// Poll forever. Never returns; the only way out is process termination.
    pub async fn run(&self, start: CursorValue) {
        let mut after = start;
        loop {
            match self.poll_once(after).await {
                Ok(outcome) => {
                    after = outcome.next_cursor;
                }
                Err(e) => warn!("Poll iteration failed: {e}"),
            }
            tokio::time::sleep(self.refresh_interval).await;
        }
    }
}
