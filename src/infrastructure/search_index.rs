//! Search index adapter (Elasticsearch-compatible bulk API)
//!
//! Documents are addressed by parcel id, so every write is an idempotent
//! insert-or-replace: re-indexing the same parcel twice leaves one logical
//! document. The index and its mapping are created on startup when missing.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::parcel::ParcelDocument;
use crate::domain::sync::{SearchSink, SyncError};
use crate::infrastructure::config::SearchConfig;

/// HTTP implementation of [`SearchSink`] against an Elasticsearch-style node.
pub struct ElasticSearchSink {
    client: Client,
    node_url: String,
    index: String,
}

impl ElasticSearchSink {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create search index HTTP client")?;

        Ok(Self {
            client,
            node_url: config.node_url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
        })
    }

    /// Create the index with its mapping if it does not exist yet.
    pub async fn ensure_index(&self) -> Result<()> {
        let index_url = format!("{}/{}", self.node_url, self.index);

        let head = self
            .client
            .head(&index_url)
            .send()
            .await
            .context("Failed to check search index existence")?;

        if head.status().is_success() {
            return Ok(());
        }
        if head.status() != StatusCode::NOT_FOUND {
            return Err(anyhow!(
                "Unexpected status checking search index: {}",
                head.status()
            ));
        }

        info!("Search index {} missing, creating with mapping", self.index);
        let response = self
            .client
            .put(&index_url)
            .json(&index_mapping())
            .send()
            .await
            .context("Failed to create search index")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Search index creation failed ({status}): {body}"));
        }
        Ok(())
    }

    fn bulk_url(&self) -> String {
        format!("{}/_bulk?refresh=true", self.node_url)
    }
}

/// Build the NDJSON body for one bulk request: an index action line followed
/// by the document source, per document.
fn bulk_body(index: &str, documents: &[ParcelDocument]) -> String {
    let mut body = String::new();
    for doc in documents {
        let action = json!({ "index": { "_index": index, "_id": doc.id } });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&serde_json::to_string(doc).expect("parcel document serializes"));
        body.push('\n');
    }
    body
}

fn index_mapping() -> serde_json::Value {
    json!({
        "mappings": {
            "properties": {
                "id": { "type": "keyword" },
                "owner": { "type": "keyword" },
                "name": { "type": "text", "analyzer": "standard" },
                "description": { "type": "text", "analyzer": "standard" },
                "image": { "type": "text", "index": false },
                "external_url": { "type": "text", "index": false },
                "attributes.area": { "type": "double" },
                "attributes.width": { "type": "integer" },
                "attributes.depth": { "type": "integer" },
                "attributes.height": { "type": "integer" },
                "attributes.elevation": { "type": "integer" },
                "attributes.suburb": { "type": "keyword" },
                "attributes.island": { "type": "keyword" },
                "attributes.has_basement": { "type": "keyword" },
                "attributes.title": { "type": "text" },
                "attributes.pre-built": { "type": "boolean" },
                "attributes.waterfront": { "type": "keyword" },
                "attributes.closest-common": { "type": "keyword" }
            }
        }
    })
}

#[async_trait]
impl SearchSink for ElasticSearchSink {
    async fn bulk_upsert(&self, documents: &[ParcelDocument]) -> Result<(), SyncError> {
        if documents.is_empty() {
            return Ok(());
        }

        let body = bulk_body(&self.index, documents);
        let response = self
            .client
            .post(self.bulk_url())
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .context("Bulk index request failed")
            .map_err(SyncError::index)?;

        if !response.status().is_success() {
            return Err(SyncError::index(anyhow!(
                "Bulk index request returned status {}",
                response.status()
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .context("Malformed bulk index response")
            .map_err(SyncError::index)?;

        // Per-item failures are logged, not fatal: delivery is at-least-once
        // and a later round re-indexes by the same id.
        if result["errors"].as_bool() == Some(true) {
            let first_error = result["items"]
                .as_array()
                .and_then(|items| {
                    items
                        .iter()
                        .find(|item| item["index"]["error"].is_object())
                })
                .map(|item| item["index"]["error"].to_string())
                .unwrap_or_else(|| "unknown".to_string());
            warn!(
                "Bulk index of {} document(s) reported item errors, first: {}",
                documents.len(),
                first_error
            );
        }

        Ok(())
    }
}
