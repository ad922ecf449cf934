//! One-time bounded-concurrency drain of the remote parcel dataset
//!
//! The drain proceeds in rounds of `W` concurrent page fetches. Every round
//! restarts page indexes at zero because the id lower bound shifts to the
//! cursor derived from the previous round; offset paging and the monotone
//! filter are applied together so a result set that shifts underneath the
//! drain cannot skip rows. The round join is a barrier: the next round
//! cannot start until every fetch of the current one has resolved, and any
//! fetch failure aborts the whole load with no cursor committed.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::domain::cursor::{CursorValue, PARCEL_CURSOR_KIND};
use crate::domain::sync::{ParcelSource, ParcelStore, SyncError};

/// Result of a completed (or skipped) bulk load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkLoadOutcome {
    /// Id of the last parcel seen in source order; zero when the dataset was
    /// empty.
    pub terminal_cursor: CursorValue,
    pub total_rows: u64,
    pub rounds: u32,
    /// True when a positive persisted cursor made the drain unnecessary.
    pub skipped: bool,
}

#[derive(Clone)]
pub struct BulkLoader {
    source: Arc<dyn ParcelSource>,
    store: Arc<dyn ParcelStore>,
    batch_size: u32,
    concurrency: u32,
}

impl BulkLoader {
    pub fn new(
        source: Arc<dyn ParcelSource>,
        store: Arc<dyn ParcelStore>,
        batch_size: u32,
        concurrency: u32,
    ) -> Self {
        Self {
            source,
            store,
            batch_size,
            concurrency,
        }
    }

    /// Drain the entire remote dataset once, persisting each page as it
    /// arrives and recording the terminal cursor under the parcel kind.
    ///
    /// Idempotent across restarts only through the persisted cursor: an
    /// existing positive cursor is trusted and the drain is skipped.
    pub async fn run(&self) -> Result<BulkLoadOutcome, SyncError> {
        if let Some(existing) = self.store.get_cursor(PARCEL_CURSOR_KIND).await? {
            if existing > 0 {
                info!(
                    "Parcels already synced up to {existing}, skipping bulk load"
                );
                return Ok(BulkLoadOutcome {
                    terminal_cursor: existing,
                    total_rows: 0,
                    rounds: 0,
                    skipped: true,
                });
            }
        }

        info!("Syncing parcels from the beginning");
        let width = self.concurrency.max(1);
        let mut cursor: CursorValue = 0;
        let mut total_rows: u64 = 0;
        let mut rounds: u32 = 0;
        let mut complete = false;

        while !complete {
            let id_gt = (cursor > 0).then_some(cursor);
            let fetches = (0..width).map(|page| {
                let source = Arc::clone(&self.source);
                let store = Arc::clone(&self.store);
                let batch_size = self.batch_size;
                async move {
                    let rows = source.fetch_page(page, batch_size, id_gt).await?;
                    debug!("Fetched page {page} with {} parcel(s)", rows.len());
                    if !rows.is_empty() {
                        // Fire-and-forget; ordering holds only across rounds.
                        store.insert_parcels_unordered(rows.clone());
                    }
                    Ok::<_, SyncError>(rows)
                }
            });

            // Barrier: all W fetches must resolve before the round is judged.
            let results = try_join_all(fetches).await?;

            // Cursor from the last non-empty page in launch order, never in
            // completion order, so the value is deterministic under jitter.
            if let Some(last_row) = results
                .iter()
                .rev()
                .find(|rows| !rows.is_empty())
                .and_then(|rows| rows.last())
            {
                cursor = last_row.id;
            }

            complete = results
                .iter()
                .any(|rows| (rows.len() as u32) < self.batch_size);
            total_rows += results.iter().map(|rows| rows.len() as u64).sum::<u64>();
            rounds += 1;
        }

        self.store.set_cursor(PARCEL_CURSOR_KIND, cursor).await?;
        info!(
            "Bulk load complete: {total_rows} row(s) over {rounds} round(s), terminal cursor {cursor}"
        );

        Ok(BulkLoadOutcome {
            terminal_cursor: cursor,
            total_rows,
            rounds,
            skipped: false,
        })
    }
}
