//! Fetch layer: how raw provider payloads reach the parsers.

pub mod http_client;
pub mod payload_store;

pub use http_client::HttpFetcher;
pub use payload_store::{save_snapshot, DirectoryFetcher};

use async_trait::async_trait;

use crate::error::Result;
use crate::types::SourceId;

/// Produces one provider's raw payload for this run
#[async_trait]
pub trait PayloadFetcher: Send + Sync {
    async fn fetch(&self, source: SourceId) -> Result<Vec<u8>>;
}
