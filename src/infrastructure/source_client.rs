//! Remote source adapter over the paginated GraphQL query API
//!
//! Bulk pages are addressed with offset paging *and* a monotone id lower
//! bound at the same time; the bulk loader relies on both being applied
//! together so a shifting underlying result set between rounds cannot skip
//! rows.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::domain::cursor::CursorValue;
use crate::domain::parcel::ParcelFragment;
use crate::domain::sync::{ParcelSource, SyncError};
use crate::infrastructure::http_client::HttpClient;

const PARCEL_FIELDS: &str = "{ id owner { id } }";
const LAND_TOKEN_FIELDS: &str = "{ id owner { id } timestamp }";

/// GraphQL-backed implementation of [`ParcelSource`].
pub struct GraphqlSourceClient {
    http: HttpClient,
    api_url: String,
    metadata_base_url: String,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize)]
struct ParcelsData {
    parcels: Vec<ParcelFragment>,
}

#[derive(Deserialize)]
struct LandTokensData {
    #[serde(rename = "landTokens")]
    land_tokens: Vec<ParcelFragment>,
}

impl GraphqlSourceClient {
    pub fn new(http: HttpClient, api_url: String, metadata_base_url: String) -> Self {
        Self {
            http,
            api_url,
            metadata_base_url: metadata_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn query<T>(&self, query: String) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let body = json!({ "query": query });
        let raw = self.http.post_json(&self.api_url, &body).await?;
        let response: GraphqlResponse<T> =
            serde_json::from_value(raw).context("Malformed GraphQL response")?;

        if let Some(errors) = response.errors {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(anyhow!("GraphQL query failed: {}", messages.join("; ")));
        }

        response
            .data
            .ok_or_else(|| anyhow!("GraphQL response carried no data"))
    }
}

#[async_trait]
impl ParcelSource for GraphqlSourceClient {
    async fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
        id_gt: Option<CursorValue>,
    ) -> Result<Vec<ParcelFragment>, SyncError> {
        let lower_bound = match id_gt {
            Some(id) => format!("id_gt: \"{id}\","),
            None => String::new(),
        };
        let query = format!(
            "{{ parcels(first: {first}, skip: {skip}, orderBy: id, orderDirection: asc, \
             where: {{ {lower_bound} }}) {PARCEL_FIELDS} }}",
            first = page_size,
            skip = page_size * page,
        );

        let data: ParcelsData = self.query(query).await.map_err(SyncError::fetch)?;
        Ok(data.parcels)
    }

    async fn fetch_changed_since(
        &self,
        after: CursorValue,
        page_size: u32,
    ) -> Result<Vec<ParcelFragment>, SyncError> {
        let query = format!(
            "{{ landTokens(first: {page_size}, orderBy: timestamp, orderDirection: asc, \
             where: {{ timestamp_gt: \"{after}\" }}) {LAND_TOKEN_FIELDS} }}",
        );

        let data: LandTokensData = self.query(query).await.map_err(SyncError::fetch)?;
        Ok(data.land_tokens)
    }

    async fn fetch_metadata(&self, id: i64) -> Result<String, SyncError> {
        let url = format!("{}/{}", self.metadata_base_url, id);
        self.http.get_text(&url).await.map_err(SyncError::fetch)
    }
}
