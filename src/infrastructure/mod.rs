//! Infrastructure layer: configuration, logging and the concrete adapters
//! behind the domain trait seams.

pub mod config;
pub mod http_client;
pub mod logging;
pub mod parcel_repository;
pub mod search_index;
pub mod source_client;

pub use config::AppConfig;
pub use http_client::{HttpClient, HttpClientConfig};
pub use parcel_repository::SqliteParcelRepository;
pub use search_index::ElasticSearchSink;
pub use source_client::GraphqlSourceClient;
