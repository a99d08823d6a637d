use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    config::SearchConfig,
    fetch::{get_error, USER_AGENT_DEFAULT},
    search::{CandidateItem, SearchClient, SearchError},
};

/// How much of an error body is kept for logs.
const ERROR_BODY_PREVIEW: usize = 200;

/// Amazon search through ScraperAPI's structured endpoint.
pub struct ScraperApiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    tld: String,
    timeout: Duration,
}

impl ScraperApiClient {
    pub fn new(config: &SearchConfig, api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT_DEFAULT)
            .pool_idle_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            tld: config.tld.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Reads the key from `SCRAPER_API_KEY`.
    pub fn from_env(config: &SearchConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("SCRAPER_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            log::warn!("SCRAPER_API_KEY is missing; every search request will be rejected");
        }
        Self::new(config, api_key)
    }

    /// Pull product cards out of a structured search response. Entries of any
    /// other type, or missing an asin, name or url, are skipped.
    pub fn extract_items(resp: &Value) -> Vec<CandidateItem> {
        let Some(results) = resp.get("results").and_then(|v| v.as_array()) else {
            return vec![];
        };

        let str_field = |v: &Value, key: &str| {
            v.get(key)
                .filter(|f| !f.is_null())
                .map(|f| match f.as_str() {
                    Some(s) => s.to_owned(),
                    None => f.to_string(),
                })
                .filter(|s| !s.is_empty())
        };

        results
            .iter()
            .filter(|r| r.is_object())
            .filter(|r| match r.get("type").and_then(|t| t.as_str()) {
                Some(kind) => kind == "search_product",
                None => true,
            })
            .filter_map(|r| {
                Some(CandidateItem {
                    id: str_field(r, "asin")?,
                    title: str_field(r, "name")?,
                    detail_url: str_field(r, "url")?,
                    image_url: str_field(r, "image"),
                    price_display: str_field(r, "price_string"),
                    rating_value: r.get("stars").and_then(|s| s.as_f64()),
                })
            })
            .collect()
    }
}

#[async_trait]
impl SearchClient for ScraperApiClient {
    async fn search(&self, keyword: &str, page: u32) -> Result<Vec<CandidateItem>, SearchError> {
        let page = page.to_string();
        let request = self.client.get(&self.endpoint).query(&[
            ("api_key", self.api_key.as_str()),
            ("query", keyword),
            ("tld", self.tld.as_str()),
            ("page", page.as_str()),
        ]);

        let exchange = async {
            let resp = request
                .send()
                .await
                .map_err(|err| SearchError::Transport(get_error(&err)))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(SearchError::Status {
                    status: status.as_u16(),
                    body: text.chars().take(ERROR_BODY_PREVIEW).collect(),
                });
            }

            resp.json::<Value>()
                .await
                .map_err(|err| SearchError::Malformed(get_error(&err)))
        };

        let body = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| SearchError::Timeout)??;

        let items = Self::extract_items(&body);
        log::debug!("scraperapi keyword={keyword:?} page={page} items={}", items.len());
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "ScraperAPI"
    }
}
