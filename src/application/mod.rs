//! Application layer: the synchronization engine and its three loops.

pub mod backfiller;
pub mod bulk_loader;
pub mod poller;
pub mod sync_engine;

pub use backfiller::Backfiller;
pub use bulk_loader::{BulkLoadOutcome, BulkLoader};
pub use poller::{PollOutcome, Poller};
pub use sync_engine::SyncEngine;

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fakes for the source, store and sink trait seams.

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::domain::cursor::CursorValue;
    use crate::domain::parcel::{Parcel, ParcelDocument, ParcelFragment};
    use crate::domain::sync::{ParcelSource, ParcelStore, SearchSink, SyncError};

    /// Scripted remote source. Bulk pages are served from `dataset` with the
    /// same semantics as the real API: filter to ids above the lower bound,
    /// order by id, then apply offset paging.
    #[derive(Default)]
    pub struct MockSource {
        pub dataset: Vec<ParcelFragment>,
        pub changed: Vec<ParcelFragment>,
        /// Raw metadata per id; absent id means the fetch fails.
        pub metadata: HashMap<i64, String>,
        /// Artificial latency per page index, to simulate network jitter.
        pub page_delays: HashMap<u32, Duration>,
        /// Page index whose fetches always fail.
        pub fail_page: Option<u32>,
        pub fetch_log: Mutex<Vec<(u32, Option<CursorValue>)>>,
    }

    impl MockSource {
        pub fn with_rows(n: i64) -> Self {
            let dataset = (1..=n)
                .map(|id| ParcelFragment::new(id, format!("0x{id:04x}")))
                .collect();
            Self {
                dataset,
                ..Default::default()
            }
        }

        /// Number of logged fetches that produced at least one row, replayed
        /// against the dataset with the page size the test used.
        pub fn non_empty_fetches(&self, page_size: u32) -> usize {
            self.fetch_log
                .lock()
                .unwrap()
                .iter()
                .filter(|(page, id_gt)| {
                    self.dataset
                        .iter()
                        .filter(|row| id_gt.is_none_or(|bound| row.id > bound))
                        .skip(*page as usize * page_size as usize)
                        .take(page_size as usize)
                        .count()
                        > 0
                })
                .count()
        }
    }

    #[async_trait]
    impl ParcelSource for MockSource {
        async fn fetch_page(
            &self,
            page: u32,
            page_size: u32,
            id_gt: Option<CursorValue>,
        ) -> Result<Vec<ParcelFragment>, SyncError> {
            self.fetch_log.lock().unwrap().push((page, id_gt));

            if let Some(delay) = self.page_delays.get(&page) {
                tokio::time::sleep(*delay).await;
            }
            if self.fail_page == Some(page) {
                return Err(SyncError::fetch(anyhow!("injected failure on page {page}")));
            }

            let rows = self
                .dataset
                .iter()
                .filter(|row| id_gt.is_none_or(|bound| row.id > bound))
                .skip(page as usize * page_size as usize)
                .take(page_size as usize)
                .cloned()
                .collect();
            Ok(rows)
        }

        async fn fetch_changed_since(
            &self,
            after: CursorValue,
            page_size: u32,
        ) -> Result<Vec<ParcelFragment>, SyncError> {
            let mut rows: Vec<ParcelFragment> = self
                .changed
                .iter()
                .filter(|row| row.timestamp.is_some_and(|ts| ts > after))
                .cloned()
                .collect();
            rows.sort_by_key(|row| row.timestamp);
            rows.truncate(page_size as usize);
            Ok(rows)
        }

        async fn fetch_metadata(&self, id: i64) -> Result<String, SyncError> {
            self.metadata
                .get(&id)
                .cloned()
                .ok_or_else(|| SyncError::fetch(anyhow!("metadata fetch failed for {id}")))
        }
    }

    #[derive(Debug, Clone)]
    pub struct StoredRow {
        pub owner: String,
        pub metadata: Option<String>,
    }

    /// In-memory row store recording every cursor write.
    #[derive(Default)]
    pub struct MockStore {
        pub rows: Mutex<HashMap<i64, StoredRow>>,
        pub cursors: Mutex<HashMap<String, CursorValue>>,
        pub cursor_writes: Mutex<Vec<(String, CursorValue)>>,
        pub unordered_batches: Mutex<Vec<Vec<i64>>>,
    }

    impl MockStore {
        pub fn with_cursor(kind: &str, value: CursorValue) -> Self {
            let store = Self::default();
            store.cursors.lock().unwrap().insert(kind.to_string(), value);
            store
        }

        pub fn insert_unenriched(&self, id: i64, owner: &str) {
            self.rows.lock().unwrap().insert(
                id,
                StoredRow {
                    owner: owner.to_string(),
                    metadata: None,
                },
            );
        }

        pub fn row_count(&self) -> usize {
            self.rows.lock().unwrap().len()
        }

        pub fn metadata_of(&self, id: i64) -> Option<String> {
            self.rows
                .lock()
                .unwrap()
                .get(&id)
                .and_then(|row| row.metadata.clone())
        }
    }

    #[async_trait]
    impl ParcelStore for MockStore {
        async fn get_cursor(&self, kind: &str) -> Result<Option<CursorValue>, SyncError> {
            Ok(self.cursors.lock().unwrap().get(kind).copied())
        }

        async fn set_cursor(&self, kind: &str, value: CursorValue) -> Result<(), SyncError> {
            self.cursors
                .lock()
                .unwrap()
                .insert(kind.to_string(), value);
            self.cursor_writes
                .lock()
                .unwrap()
                .push((kind.to_string(), value));
            Ok(())
        }

        async fn upsert_parcels(&self, rows: &[ParcelFragment]) -> Result<(), SyncError> {
            let mut stored = self.rows.lock().unwrap();
            for row in rows {
                let metadata = stored.get(&row.id).and_then(|r| r.metadata.clone());
                stored.insert(
                    row.id,
                    StoredRow {
                        owner: row.owner.id.clone(),
                        metadata,
                    },
                );
            }
            Ok(())
        }

        fn insert_parcels_unordered(&self, rows: Vec<ParcelFragment>) {
            self.unordered_batches
                .lock()
                .unwrap()
                .push(rows.iter().map(|r| r.id).collect());
            let mut stored = self.rows.lock().unwrap();
            for row in rows {
                let metadata = stored.get(&row.id).and_then(|r| r.metadata.clone());
                stored.insert(
                    row.id,
                    StoredRow {
                        owner: row.owner.id.clone(),
                        metadata,
                    },
                );
            }
        }

        async fn find_missing_metadata(&self) -> Result<Vec<Parcel>, SyncError> {
            let now = Utc::now();
            let mut parcels: Vec<Parcel> = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, row)| row.metadata.is_none())
                .map(|(id, row)| Parcel {
                    id: *id,
                    owner: row.owner.clone(),
                    metadata: None,
                    created_at: now,
                    updated_at: now,
                    deleted_at: None,
                })
                .collect();
            parcels.sort_by_key(|p| p.id);
            Ok(parcels)
        }

        async fn set_metadata(&self, id: i64, raw: &str) -> Result<(), SyncError> {
            let mut stored = self.rows.lock().unwrap();
            if let Some(row) = stored.get_mut(&id) {
                row.metadata = Some(raw.to_string());
            }
            Ok(())
        }
    }

    /// Search sink recording each bulk call and keeping one logical document
    /// per id, mirroring idempotent key-addressed upserts.
    #[derive(Default)]
    pub struct MockSink {
        pub batches: Mutex<Vec<Vec<ParcelDocument>>>,
        pub documents: Mutex<HashMap<String, ParcelDocument>>,
    }

    impl MockSink {
        pub fn batch_count(&self) -> usize {
            self.batches.lock().unwrap().len()
        }

        pub fn document_count(&self) -> usize {
            self.documents.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SearchSink for MockSink {
        async fn bulk_upsert(&self, documents: &[ParcelDocument]) -> Result<(), SyncError> {
            self.batches.lock().unwrap().push(documents.to_vec());
            let mut stored = self.documents.lock().unwrap();
            for doc in documents {
                stored.insert(doc.id.clone(), doc.clone());
            }
            Ok(())
        }
    }
}
