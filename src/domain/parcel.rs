//! Parcel entity and its wire/search representations
//!
//! Three shapes of the same thing:
//! - [`ParcelFragment`]: what one paginated fetch returns, transient.
//! - [`Parcel`]: the durable row (metadata attached only after enrichment).
//! - [`ParcelDocument`]: the flattened search-index document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Durable parcel row. `metadata` holds the raw token-URI content exactly as
/// fetched and stays `None` until an enrichment round succeeds for this id.
/// Only content that parses to a non-empty object ever reaches the search
/// index; the raw row write is deliberately lenient so a fetch is not
/// repeated for content the secondary source serves malformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: i64,
    pub owner: String,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker, schema-reserved. This pipeline never sets it.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Owner reference as returned by the source API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRef {
    pub id: String,
}

/// One parcel as returned by a paginated source fetch. Ids and timestamps
/// arrive as decimal strings from the query API; they are normalized to
/// integers at deserialization so cursor math never re-parses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelFragment {
    #[serde(deserialize_with = "de_i64_from_string_or_number")]
    pub id: i64,
    pub owner: OwnerRef,
    /// Source-side update timestamp; present on poll results, absent on
    /// bulk-load pages.
    #[serde(default, deserialize_with = "de_opt_i64_from_string_or_number")]
    pub timestamp: Option<i64>,
}

impl ParcelFragment {
    pub fn new(id: i64, owner: impl Into<String>) -> Self {
        Self {
            id,
            owner: OwnerRef { id: owner.into() },
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Structured attribute block carried by parcel metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParcelAttributes {
    #[serde(default)]
    pub area: f64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub depth: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub elevation: i64,
    #[serde(default)]
    pub suburb: String,
    #[serde(default)]
    pub island: String,
    #[serde(default)]
    pub has_basement: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "pre-built")]
    pub pre_built: bool,
    #[serde(default)]
    pub waterfront: String,
    #[serde(default, rename = "closest-common")]
    pub closest_common: String,
}

/// Parsed token-URI metadata for one parcel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParcelMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub external_url: String,
    #[serde(default)]
    pub attributes: Option<ParcelAttributes>,
}

impl ParcelMetadata {
    /// Parse raw metadata content into its structured form.
    ///
    /// Returns `None` for anything that is not a non-empty JSON object; such
    /// content is still persisted raw but must not reach the search index.
    pub fn parse(raw: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        let object = value.as_object()?;
        if object.is_empty() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

/// Search-index document, flattened and keyed by parcel id. Parcels without
/// metadata are indexed with empty metadata fields so identity and ownership
/// stay searchable right after bulk load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelDocument {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub description: String,
    pub image: String,
    pub external_url: String,
    pub attributes: Option<ParcelAttributes>,
}

impl ParcelDocument {
    /// Document for a parcel that has not been enriched yet.
    pub fn bare(id: i64, owner: &str) -> Self {
        Self {
            id: id.to_string(),
            owner: owner.to_string(),
            name: String::new(),
            description: String::new(),
            image: String::new(),
            external_url: String::new(),
            attributes: None,
        }
    }

    /// Document carrying enriched metadata fields.
    pub fn enriched(id: i64, owner: &str, metadata: &ParcelMetadata) -> Self {
        Self {
            id: id.to_string(),
            owner: owner.to_string(),
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            image: metadata.image.clone(),
            external_url: metadata.external_url.clone(),
            attributes: metadata.attributes.clone(),
        }
    }
}

impl From<&ParcelFragment> for ParcelDocument {
    fn from(fragment: &ParcelFragment) -> Self {
        Self::bare(fragment.id, &fragment.owner.id)
    }
}

fn de_i64_from_string_or_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Number(i64),
        Text(String),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Number(n) => Ok(n),
        StringOrNumber::Text(s) => s.parse::<i64>().map_err(serde::de::Error::custom),
    }
}

fn de_opt_i64_from_string_or_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "de_i64_from_string_or_number")] i64);

    Option::<Wrapper>::deserialize(deserializer).map(|opt| opt.map(|w| w.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_accepts_string_and_numeric_ids() {
        let from_string: ParcelFragment =
            serde_json::from_str(r#"{"id": "42", "owner": {"id": "0xabc"}}"#).unwrap();
        let from_number: ParcelFragment =
            serde_json::from_str(r#"{"id": 42, "owner": {"id": "0xabc"}}"#).unwrap();
        assert_eq!(from_string, from_number);
        assert_eq!(from_string.id, 42);
        assert!(from_string.timestamp.is_none());
    }

    #[test]
    fn fragment_parses_string_timestamp() {
        let fragment: ParcelFragment = serde_json::from_str(
            r#"{"id": "7", "owner": {"id": "0xdef"}, "timestamp": "1700000000"}"#,
        )
        .unwrap();
        assert_eq!(fragment.timestamp, Some(1_700_000_000));
    }

    #[test]
    fn metadata_parse_rejects_empty_object_and_non_object() {
        assert!(ParcelMetadata::parse("{}").is_none());
        assert!(ParcelMetadata::parse("[]").is_none());
        assert!(ParcelMetadata::parse("not json").is_none());
        assert!(ParcelMetadata::parse("\"string\"").is_none());
    }

    #[test]
    fn metadata_parse_accepts_partial_object() {
        let metadata = ParcelMetadata::parse(r#"{"name": "12 West"}"#).unwrap();
        assert_eq!(metadata.name, "12 West");
        assert!(metadata.description.is_empty());
        assert!(metadata.attributes.is_none());
    }

    #[test]
    fn metadata_parse_reads_renamed_attribute_keys() {
        let raw = r#"{
            "name": "The Docks",
            "attributes": {
                "area": 144.0,
                "suburb": "Le Marais",
                "pre-built": true,
                "closest-common": "plaza"
            }
        }"#;
        let metadata = ParcelMetadata::parse(raw).unwrap();
        let attributes = metadata.attributes.unwrap();
        assert!(attributes.pre_built);
        assert_eq!(attributes.closest_common, "plaza");
        assert_eq!(attributes.suburb, "Le Marais");
    }

    #[test]
    fn bare_document_keeps_identity_fields_searchable() {
        let doc = ParcelDocument::bare(15, "0xowner");
        assert_eq!(doc.id, "15");
        assert_eq!(doc.owner, "0xowner");
        assert!(doc.name.is_empty());
        assert!(doc.attributes.is_none());
    }
}
