pub mod scraperapi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use scraperapi::ScraperApiClient;

/// One product card from a catalog search page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateItem {
    /// Unique per catalog.
    pub id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub detail_url: String,
    pub price_display: Option<String>,
    pub rating_value: Option<f64>,
}

/// A search request that did not produce a page of results.
///
/// An empty page is `Ok(vec![])`, never one of these.
#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    #[error("provider answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SearchError {
    /// Provider status code, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            SearchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Fetch one page (1-based) of results for `keyword`.
    async fn search(&self, keyword: &str, page: u32) -> Result<Vec<CandidateItem>, SearchError>;

    /// Get the name of this client for logging
    fn name(&self) -> &'static str;
}
