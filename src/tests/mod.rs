use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use tokio::sync::mpsc;

use crate::{
    fetch::ImageFetch,
    hash::{self, Hasher},
    scan::{ScanEvent, Scanner},
    search::{CandidateItem, SearchClient, SearchError},
};


pub const REFERENCE_URL: &str = "ref://front";
/// Same picture as the reference at a different size.
pub const MATCHING_IMAGE: &str = "img://match";
/// Half the bits differ from the reference.
pub const OTHER_IMAGE: &str = "img://other";

/// In-memory catalog keyed by (keyword, page). Unknown pages are empty.
#[derive(Default)]
pub struct FakeSearch {
    pages: HashMap<(String, u32), Vec<CandidateItem>>,
    failures: HashMap<(String, u32), (u16, Duration)>,
    calls: AtomicUsize,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, keyword: &str, page: u32, items: Vec<CandidateItem>) -> Self {
        self.pages.insert((keyword.to_string(), page), items);
        self
    }

    /// Answer `status` for this page, after `delay`.
    pub fn fail(mut self, keyword: &str, page: u32, status: u16, delay: Duration) -> Self {
        self.failures
            .insert((keyword.to_string(), page), (status, delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchClient for FakeSearch {
    async fn search(&self, keyword: &str, page: u32) -> Result<Vec<CandidateItem>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = (keyword.to_string(), page);

        if let Some(&(status, delay)) = self.failures.get(&key) {
            tokio::time::sleep(delay).await;
            return Err(SearchError::Status {
                status,
                body: "upstream exploded".to_string(),
            });
        }

        Ok(self.pages.get(&key).cloned().unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Serves fixed bytes per URL; everything else is a failed download.
pub struct MapImageFetch {
    images: HashMap<String, Vec<u8>>,
}

impl MapImageFetch {
    pub fn standard() -> Self {
        let mut images = HashMap::new();
        images.insert(REFERENCE_URL.to_string(), hash::tests::split_png(64, 64));
        images.insert(MATCHING_IMAGE.to_string(), hash::tests::split_png(48, 32));
        images.insert(OTHER_IMAGE.to_string(), hash::tests::stacked_png(64, 64));
        images.insert("img://broken".to_string(), b"<html>404</html>".to_vec());
        Self { images }
    }
}

#[async_trait]
impl ImageFetch for MapImageFetch {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Option<Vec<u8>> {
        self.images.get(url).cloned()
    }
}

pub fn item(id: &str, title: &str, image_url: Option<&str>) -> CandidateItem {
    CandidateItem {
        id: id.to_string(),
        title: title.to_string(),
        image_url: image_url.map(str::to_string),
        detail_url: format!("https://www.amazon.com/dp/{id}"),
        price_display: Some("$39.99".to_string()),
        rating_value: Some(4.2),
    }
}

/// Scanner over `search` with the standard reference image.
pub fn create_scanner(search: Arc<FakeSearch>, keywords: &[&str]) -> Scanner {
    create_scanner_with(search, keywords, vec![REFERENCE_URL.to_string()])
}

pub fn create_scanner_with(
    search: Arc<FakeSearch>,
    keywords: &[&str],
    reference_images: Vec<String>,
) -> Scanner {
    create_scanner_with_fetch(
        search,
        keywords,
        reference_images,
        Arc::new(MapImageFetch::standard()),
    )
}

pub fn create_scanner_with_fetch(
    search: Arc<dyn SearchClient>,
    keywords: &[&str],
    reference_images: Vec<String>,
    fetch: Arc<dyn ImageFetch>,
) -> Scanner {
    let hasher = Hasher::new(fetch, Duration::from_secs(1));
    Scanner::new(
        search,
        hasher,
        keywords.iter().map(|k| k.to_string()).collect(),
        reference_images,
    )
}

/// Drain the stream until the scan hangs up.
pub async fn collect(mut events: mpsc::UnboundedReceiver<ScanEvent>) -> Vec<ScanEvent> {
    let mut out = Vec::new();
    let drain = async {
        while let Some(event) = events.recv().await {
            out.push(event);
        }
    };
    tokio::time::timeout(Duration::from_secs(10), drain)
        .await
        .expect("scan did not finish");
    out
}

/// Serve `app` on an ephemeral local port and return its base url.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
