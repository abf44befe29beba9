pub mod xhs;

use async_trait::async_trait;
use serde_json::Value;

use crate::crawler::error::CrawlError;

pub use xhs::XhsClient;

/// Fetches one note record. The record is passed through untouched.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NoteClient: Send + Sync {
    async fn fetch_note(&self, id: &str, access_token: &str) -> Result<Value, CrawlError>;
}
