use async_trait::async_trait;
use std::{error::Error, time::Duration};

pub const USER_AGENT_DEFAULT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:124.0) Gecko/20100101 Firefox/124.0";

/// Walks two levels into the error chain; reqwest's top-level message is
/// rarely the interesting one.
pub fn get_error(error: &reqwest::Error) -> String {
    match error.source() {
        Some(e) => match e.source() {
            Some(e) => e.to_string(),
            None => e.to_string(),
        },
        None => error.to_string(),
    }
}

/// Source of raw image bytes.
///
/// Returns `None` for anything short of a complete, successful body: timeouts,
/// transport errors and non-2xx statuses all look the same to the hasher.
#[async_trait]
pub trait ImageFetch: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Option<Vec<u8>>;
}

pub struct HttpImageFetch {
    client: reqwest::Client,
}

impl HttpImageFetch {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT_DEFAULT)
            .pool_idle_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetch for HttpImageFetch {
    async fn fetch(&self, url: &str, timeout: Duration) -> Option<Vec<u8>> {
        let request = async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                log::debug!("{url}: {status}");
                return Ok(None);
            }
            resp.bytes().await.map(|b| Some(b.to_vec()))
        };

        // the deadline covers headers and body together
        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) => {
                log::debug!("{url}: {}", get_error(&err));
                None
            }
            Err(_) => {
                log::debug!("{url}: timed out after {timeout:?}");
                None
            }
        }
    }
}
