//! Metadata enrichment backfill
//!
//! Runs independently of the poll loop: scan the row store for parcels that
//! have never been enriched, fetch each one's token-URI content from the
//! secondary source, persist it, and index parcels whose content parses.
//! Per-parcel failures are isolated; a failed parcel is set aside for the
//! rest of this run and retried only after a process restart. Rounds repeat
//! back to back until nothing retryable remains, then the loop exits for
//! good (a fresh backlog created later is not picked up until restart).

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::domain::parcel::{Parcel, ParcelDocument, ParcelMetadata};
use crate::domain::sync::{ParcelSource, ParcelStore, SearchSink, SyncError};

/// Result of one enrichment round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// No retryable unenriched parcels remain.
    Drained,
    /// The round processed a non-empty set.
    Progress {
        enriched: usize,
        indexed: usize,
        failed: usize,
    },
}

#[derive(Clone)]
pub struct Backfiller {
    source: Arc<dyn ParcelSource>,
    store: Arc<dyn ParcelStore>,
    sink: Arc<dyn SearchSink>,
}

impl Backfiller {
    pub fn new(
        source: Arc<dyn ParcelSource>,
        store: Arc<dyn ParcelStore>,
        sink: Arc<dyn SearchSink>,
    ) -> Self {
        Self {
            source,
            store,
            sink,
        }
    }

    /// Run enrichment rounds until the unenriched set is drained.
    pub async fn run(&self) {
        let mut failed_ids: HashSet<i64> = HashSet::new();
        loop {
            match self.run_round(&mut failed_ids).await {
                Ok(RoundOutcome::Drained) => {
                    info!(
                        "Metadata backfill complete ({} parcel(s) left for next restart)",
                        failed_ids.len()
                    );
                    break;
                }
                Ok(RoundOutcome::Progress {
                    enriched,
                    indexed,
                    failed,
                }) => {
                    debug!(
                        "Enrichment round done: {enriched} enriched, {indexed} indexed, {failed} failed"
                    );
                }
                Err(e) => {
                    error!("Enrichment round aborted: {e}");
                    break;
                }
            }
        }
    }

    /// One enrichment round over the current unenriched set, skipping ids
    /// that already failed during this run.
    pub async fn run_round(
        &self,
        failed_ids: &mut HashSet<i64>,
    ) -> Result<RoundOutcome, SyncError> {
        let parcels: Vec<Parcel> = self
            .store
            .find_missing_metadata()
            .await?
            .into_iter()
            .filter(|parcel| !failed_ids.contains(&parcel.id))
            .collect();

        if parcels.is_empty() {
            return Ok(RoundOutcome::Drained);
        }
        info!(
            "Started new token URI fetch round with {} parcel(s)",
            parcels.len()
        );

        let mut enriched = 0;
        let mut indexed = 0;
        let mut failed = 0;

        // Sequential on purpose: the secondary source is fetched one parcel
        // at a time, and one bad parcel must not sink the round.
        for parcel in &parcels {
            match self.enrich_one(parcel).await {
                Ok(true) => {
                    enriched += 1;
                    indexed += 1;
                }
                Ok(false) => enriched += 1,
                Err(e) => {
                    failed += 1;
                    failed_ids.insert(parcel.id);
                    warn!("Token {} URI content fetch failed: {e}", parcel.id);
                }
            }
        }

        Ok(RoundOutcome::Progress {
            enriched,
            indexed,
            failed,
        })
    }

    /// Enrich a single parcel. Returns true when the content parsed and the
    /// parcel was pushed to the search sink.
    async fn enrich_one(&self, parcel: &Parcel) -> Result<bool, SyncError> {
        let raw = self.source.fetch_metadata(parcel.id).await?;
        debug!("Fetched metadata for parcel {}", parcel.id);

        // Raw content is persisted even when it does not parse, so the same
        // malformed payload is not fetched again on the next round.
        self.store.set_metadata(parcel.id, &raw).await?;

        if let Some(metadata) = ParcelMetadata::parse(&raw) {
            let document = ParcelDocument::enriched(parcel.id, &parcel.owner, &metadata);
            self.sink.bulk_upsert(std::slice::from_ref(&document)).await?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{MockSink, MockSource, MockStore};
    use std::collections::HashMap;

    fn backfiller_with(
        source: MockSource,
        store: &Arc<MockStore>,
        sink: &Arc<MockSink>,
    ) -> Backfiller {
        Backfiller::new(
            Arc::new(source),
            Arc::clone(store) as Arc<dyn ParcelStore>,
            Arc::clone(sink) as Arc<dyn SearchSink>,
        )
    }

    #[tokio::test]
    async fn failed_fetch_is_isolated_to_its_parcel() {
        let store = Arc::new(MockStore::default());
        store.insert_unenriched(1, "0xaaa");
        store.insert_unenriched(2, "0xbbb");
        store.insert_unenriched(3, "0xccc");

        // No entry for id 2: its fetch fails
        let source = MockSource {
            metadata: HashMap::from([
                (1, r#"{"name": "one"}"#.to_string()),
                (3, r#"{"name": "three"}"#.to_string()),
            ]),
            ..Default::default()
        };
        let sink = Arc::new(MockSink::default());
        let backfiller = backfiller_with(source, &store, &sink);

        backfiller.run().await;

        assert_eq!(store.metadata_of(1).as_deref(), Some(r#"{"name": "one"}"#));
        assert_eq!(store.metadata_of(2), None);
        assert_eq!(store.metadata_of(3).as_deref(), Some(r#"{"name": "three"}"#));

        // Exactly two single-entity upserts reached the sink
        assert_eq!(sink.batch_count(), 2);
        assert!(sink.batches.lock().unwrap().iter().all(|b| b.len() == 1));
        assert_eq!(sink.document_count(), 2);
    }

    #[tokio::test]
    async fn unparseable_content_is_persisted_but_not_indexed() {
        let store = Arc::new(MockStore::default());
        store.insert_unenriched(5, "0xddd");

        let source = MockSource {
            metadata: HashMap::from([(5, "{}".to_string())]),
            ..Default::default()
        };
        let sink = Arc::new(MockSink::default());
        let backfiller = backfiller_with(source, &store, &sink);

        let mut failed = HashSet::new();
        let outcome = backfiller.run_round(&mut failed).await.unwrap();

        assert_eq!(
            outcome,
            RoundOutcome::Progress {
                enriched: 1,
                indexed: 0,
                failed: 0
            }
        );
        assert_eq!(store.metadata_of(5).as_deref(), Some("{}"));
        assert_eq!(sink.batch_count(), 0);
    }

    #[tokio::test]
    async fn empty_backlog_is_drained_immediately() {
        let store = Arc::new(MockStore::default());
        let source = MockSource::default();
        let sink = Arc::new(MockSink::default());
        let backfiller = backfiller_with(source, &store, &sink);

        let mut failed = HashSet::new();
        let outcome = backfiller.run_round(&mut failed).await.unwrap();
        assert_eq!(outcome, RoundOutcome::Drained);
    }

    #[tokio::test]
    async fn run_terminates_even_when_every_fetch_fails() {
        let store = Arc::new(MockStore::default());
        store.insert_unenriched(8, "0xeee");
        store.insert_unenriched(9, "0xfff");

        let source = MockSource::default(); // no metadata at all
        let sink = Arc::new(MockSink::default());
        let backfiller = backfiller_with(source, &store, &sink);

        // Failed parcels are set aside instead of retried in a hot loop, so
        // this returns instead of spinning.
        backfiller.run().await;

        assert_eq!(store.metadata_of(8), None);
        assert_eq!(store.metadata_of(9), None);
        assert_eq!(sink.batch_count(), 0);
    }

    #[tokio::test]
    async fn never_touches_the_sync_cursor() {
        let store = Arc::new(MockStore::default());
        store.insert_unenriched(1, "0xaaa");

        let source = MockSource {
            metadata: HashMap::from([(1, r#"{"name": "one"}"#.to_string())]),
            ..Default::default()
        };
        let sink = Arc::new(MockSink::default());
        let backfiller = backfiller_with(source, &store, &sink);

        backfiller.run().await;
        assert!(store.cursor_writes.lock().unwrap().is_empty());
    }
}
