use serde::{Deserialize, Serialize};

use crate::{config, score::ScoreBreakdown};

pub const DEFAULT_PAGES_PER_KEYWORD: u32 = 4;
pub const DEFAULT_MAX_ITEMS_PER_PAGE: usize = 24;
pub const DEFAULT_MIN_SCORE: f64 = 0.15;

/// Per-scan knobs, already clamped to their allowed ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanParams {
    pub pages_per_keyword: u32,
    pub max_items_per_page: usize,
    pub min_score: f64,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            pages_per_keyword: DEFAULT_PAGES_PER_KEYWORD,
            max_items_per_page: DEFAULT_MAX_ITEMS_PER_PAGE,
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl ScanParams {
    /// Pages 1..=10, items 5..=50, score 0..=1. Missing or non-finite inputs
    /// take the default.
    pub fn clamped(pages: Option<f64>, max_per_page: Option<f64>, min_score: Option<f64>) -> Self {
        Self {
            pages_per_keyword: config::clamp_int(pages, 1, 10, DEFAULT_PAGES_PER_KEYWORD as i64)
                as u32,
            max_items_per_page: config::clamp_int(
                max_per_page,
                5,
                50,
                DEFAULT_MAX_ITEMS_PER_PAGE as i64,
            ) as usize,
            min_score: config::clamp_float(min_score, 0.0, 1.0, DEFAULT_MIN_SCORE),
        }
    }
}

/// A scored listing handed to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub detail_url: String,
    pub title: String,
    pub price_display: Option<String>,
    pub rating_value: Option<f64>,
    pub image_url: Option<String>,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub reasons: Vec<String>,
    /// Search phrase that surfaced the listing first
    pub keyword: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScanEvent {
    Progress {
        message: String,
        scanned: u64,
        hits: u64,
    },
    Result {
        item: Listing,
    },
    /// Terminal: the scan finished.
    Done { message: String },
    /// Terminal: the scan stopped early.
    Error { message: String },
}

impl ScanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ScanEvent::Progress { .. } => "progress",
            ScanEvent::Result { .. } => "result",
            ScanEvent::Done { .. } => "done",
            ScanEvent::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub scanned: u64,
    pub hits: u64,
}
