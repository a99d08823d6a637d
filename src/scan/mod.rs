//! Scan orchestration.
//!
//! Fans out one task per (keyword, page) under a page pool, scores every
//! newly discovered listing under an image pool shared with reference
//! hashing, and streams progress and results as they settle.
//!
//! - Page pool: at most [`PAGE_CONCURRENCY`] searches (plus their item
//!   dispatch) in flight.
//! - Image pool: at most [`IMAGE_CONCURRENCY`] fingerprinting operations in
//!   flight, across all pages.
//! - The first search failure cancels everything and fails the scan.

pub mod types;

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures_util::future::join_all;
use tokio::{
    sync::{mpsc, Semaphore},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    errors::ScanError,
    fetch::HttpImageFetch,
    hash::{Fingerprint, Hasher},
    score,
    search::{CandidateItem, ScraperApiClient, SearchClient},
    text_score,
};

pub use types::{Listing, ScanEvent, ScanParams, ScanSummary};

pub const PAGE_CONCURRENCY: usize = 6;
pub const IMAGE_CONCURRENCY: usize = 10;
/// Emit a progress summary every this many scored listings.
const PROGRESS_EVERY: u64 = 25;

/// Score one listing. Pure: the same inputs always give the same listing.
pub fn build_listing(
    item: CandidateItem,
    keyword: &str,
    fingerprint: Option<Fingerprint>,
    references: &[Fingerprint],
) -> Listing {
    let text = text_score::score_text(&item.title);

    let (image, image_reason) = match fingerprint {
        Some(fp) => score::image_similarity(fp, references),
        None => (0.0, None),
    };

    let bonus = score::category_bonus(&item.title, text.score);
    let total = score::combine(text.score, image, bonus);

    let mut reasons = text.reasons;
    reasons.extend(image_reason);

    Listing {
        id: item.id,
        detail_url: item.detail_url,
        title: item.title,
        price_display: item.price_display,
        rating_value: item.rating_value,
        image_url: item.image_url,
        score: total,
        breakdown: score::ScoreBreakdown {
            text: text.score,
            image,
            bonus,
        },
        reasons,
        keyword: keyword.to_string(),
    }
}

#[derive(Default)]
struct Tally {
    scanned: u64,
    hits: u64,
}

/// Everything one scan shares between its tasks. Dropped with the scan.
struct ScanState {
    params: ScanParams,
    search: Arc<dyn SearchClient>,
    hasher: Hasher,
    references: Vec<Fingerprint>,
    page_pool: Semaphore,
    image_pool: Arc<Semaphore>,
    seen: Mutex<HashSet<String>>,
    tally: Mutex<Tally>,
    events: mpsc::UnboundedSender<ScanEvent>,
    cancel: CancellationToken,
}

/// A panicking item task must not take the counters down with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScanState {
    fn emit(&self, event: ScanEvent) {
        // nobody is listening anymore, stop working for them
        if self.events.send(event).is_err() {
            self.cancel.cancel();
        }
    }

    fn progress(&self, message: String) {
        let tally = lock(&self.tally);
        self.emit(ScanEvent::Progress {
            message,
            scanned: tally.scanned,
            hits: tally.hits,
        });
    }

    /// Check-and-insert in one step. True for the first caller only.
    fn mark_seen(&self, id: &str) -> bool {
        lock(&self.seen).insert(id.to_string())
    }

    /// Count a finished listing and emit it if it qualifies.
    fn record(&self, listing: Listing) {
        let mut tally = lock(&self.tally);
        if self.cancel.is_cancelled() {
            return;
        }

        tally.scanned += 1;
        if listing.score >= self.params.min_score {
            tally.hits += 1;
            self.emit(ScanEvent::Result { item: listing });
        }

        if tally.scanned % PROGRESS_EVERY == 0 {
            self.emit(ScanEvent::Progress {
                message: format!("Scanned {} listings, found {}…", tally.scanned, tally.hits),
                scanned: tally.scanned,
                hits: tally.hits,
            });
        }
    }

    /// Stop every task and wait until no listing can be recorded anymore.
    fn close(&self) {
        self.cancel.cancel();
        // a record() that got past its cancellation check still holds the lock
        drop(lock(&self.tally));
    }

    fn summary(&self) -> ScanSummary {
        let tally = lock(&self.tally);
        ScanSummary {
            scanned: tally.scanned,
            hits: tally.hits,
        }
    }

    async fn run_page(self: Arc<Self>, keyword: String, page: u32) -> Result<(), ScanError> {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ScanError::Cancelled),
            permit = self.page_pool.acquire() => permit.map_err(|_| ScanError::Cancelled)?,
        };

        self.progress(format!("Searching: \"{keyword}\" (page {page})…"));

        let mut results = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ScanError::Cancelled),
            results = self.search.search(&keyword, page) => results.map_err(|source| {
                ScanError::Search {
                    keyword: keyword.clone(),
                    page,
                    source,
                }
            })?,
        };
        results.truncate(self.params.max_items_per_page);

        let mut items = JoinSet::new();
        let mut dispatched = 0usize;
        for item in results {
            if !self.mark_seen(&item.id) {
                continue;
            }
            dispatched += 1;
            items.spawn(self.clone().score_item(item, keyword.clone()));
        }
        log::debug!("keyword={keyword:?} page={page} dispatched={dispatched}");

        // settle every item; one bad listing never fails the page
        while let Some(result) = items.join_next().await {
            if let Err(err) = result {
                if err.is_panic() {
                    log::warn!("keyword={keyword:?} page={page}: item task panicked: {err}");
                }
            }
        }

        Ok(())
    }

    async fn score_item(self: Arc<Self>, item: CandidateItem, keyword: String) {
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            permit = self.image_pool.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let fingerprint = match item.image_url.as_deref() {
            Some(url) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                fp = self.hasher.fingerprint(url) => fp,
            },
            None => None,
        };

        let listing = build_listing(item, &keyword, fingerprint, &self.references);
        self.record(listing);
    }
}

/// Reusable scan driver. Cheap to clone; every [`Scanner::run`] gets fresh
/// state.
#[derive(Clone)]
pub struct Scanner {
    search: Arc<dyn SearchClient>,
    hasher: Hasher,
    keywords: Arc<[String]>,
    reference_images: Arc<[String]>,
}

impl Scanner {
    pub fn new(
        search: Arc<dyn SearchClient>,
        hasher: Hasher,
        keywords: Vec<String>,
        reference_images: Vec<String>,
    ) -> Self {
        Self {
            search,
            hasher,
            keywords: keywords.into(),
            reference_images: reference_images.into(),
        }
    }

    /// ScraperAPI for search, plain HTTP for images.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let search = Arc::new(ScraperApiClient::from_env(&config.search)?);
        let hasher = Hasher::new(
            Arc::new(HttpImageFetch::new()?),
            Duration::from_secs(config.image_timeout_secs),
        );

        let keywords = config
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        Ok(Self::new(
            search,
            hasher,
            keywords,
            config.reference_images.clone(),
        ))
    }

    async fn hash_references(
        &self,
        pool: &Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Fingerprint>, ScanError> {
        let jobs = self.reference_images.iter().map(|url| {
            let pool = pool.clone();
            let hasher = self.hasher.clone();
            async move {
                let _permit = pool.acquire().await.ok()?;
                let fp = hasher.fingerprint(url).await;
                if fp.is_none() {
                    log::warn!("reference image could not be hashed: {url}");
                }
                fp
            }
        });

        let hashed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScanError::Cancelled),
            hashed = join_all(jobs) => hashed,
        };

        let references: Vec<Fingerprint> = hashed.into_iter().flatten().collect();
        if references.is_empty() {
            return Err(ScanError::Configuration(
                "Could not hash reference images (network/format issue).".to_string(),
            ));
        }

        Ok(references)
    }

    /// Run one scan to completion, streaming progress and result events into
    /// `events`. Does not send the terminal event; see [`Scanner::spawn`].
    ///
    /// Fails on the first search error, on cancellation (through `cancel` or
    /// a dropped receiver), or when no reference image can be hashed. Events
    /// already sent stay sent.
    pub async fn run(
        &self,
        params: ScanParams,
        events: mpsc::UnboundedSender<ScanEvent>,
        cancel: CancellationToken,
    ) -> Result<ScanSummary, ScanError> {
        let image_pool = Arc::new(Semaphore::new(IMAGE_CONCURRENCY));

        let started = events.send(ScanEvent::Progress {
            message: "Hashing reference images…".to_string(),
            scanned: 0,
            hits: 0,
        });
        if started.is_err() {
            cancel.cancel();
        }

        let references = self.hash_references(&image_pool, &cancel).await?;
        log::info!(
            "hashed {}/{} reference images",
            references.len(),
            self.reference_images.len()
        );

        let state = Arc::new(ScanState {
            params,
            search: self.search.clone(),
            hasher: self.hasher.clone(),
            references,
            page_pool: Semaphore::new(PAGE_CONCURRENCY),
            image_pool,
            seen: Mutex::new(HashSet::new()),
            tally: Mutex::new(Tally::default()),
            events,
            cancel,
        });

        let mut pages = JoinSet::new();
        for keyword in self.keywords.iter() {
            for page in 1..=params.pages_per_keyword {
                pages.spawn(state.clone().run_page(keyword.clone(), page));
            }
        }
        log::info!(
            "scan started: {} page tasks via {}",
            pages.len(),
            self.search.name()
        );

        while let Some(result) = pages.join_next().await {
            let failure = match result {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(err) if err.is_cancelled() => continue,
                Err(err) => ScanError::Other(anyhow::anyhow!("page task panicked: {err}")),
            };

            state.close();
            pages.abort_all();
            while pages.join_next().await.is_some() {}

            if !matches!(failure, ScanError::Cancelled) {
                log::error!("scan aborted: {}", failure.summary());
                log::debug!("scan aborted: {failure}");
            }
            return Err(failure);
        }

        if state.cancel.is_cancelled() {
            state.close();
            return Err(ScanError::Cancelled);
        }

        let summary = state.summary();
        state.progress(format!(
            "Done. Scanned {} unique listings, found {} possible matches.",
            summary.scanned, summary.hits
        ));
        log::info!("scan finished: scanned={} hits={}", summary.scanned, summary.hits);

        Ok(summary)
    }

    /// Start a scan in the background. The receiver gets every event and
    /// exactly one terminal event (`Done` or `Error`) last.
    pub fn spawn(
        &self,
        params: ScanParams,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<ScanEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let scanner = self.clone();

        tokio::spawn(async move {
            let terminal = match scanner.run(params, tx.clone(), cancel).await {
                Ok(_) => ScanEvent::Done {
                    message: "Scan complete.".to_string(),
                },
                Err(err) => ScanEvent::Error {
                    message: err.public_message(),
                },
            };
            let _ = tx.send(terminal);
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_survives_poisoning() {
        let tally = Arc::new(Mutex::new(Tally::default()));

        let poisoner = tally.clone();
        let result = std::thread::spawn(move || {
            let mut guard = poisoner.lock().unwrap();
            guard.scanned = 3;
            panic!("item task blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(tally.is_poisoned());

        let mut guard = lock(&tally);
        guard.scanned += 1;
        assert_eq!(guard.scanned, 4);
    }
}
