use crate::search::SearchError;

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The scan cannot start, e.g. no reference image could be hashed.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("search failed for {keyword:?} page {page}: {source}")]
    Search {
        keyword: String,
        page: u32,
        #[source]
        source: SearchError,
    },

    #[error("scan cancelled")]
    Cancelled,

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl ScanError {
    /// Message safe to show to whoever is watching the stream: no provider
    /// bodies, keys or chains.
    pub fn public_message(&self) -> String {
        match self {
            ScanError::Configuration(msg) => msg.clone(),
            ScanError::Search { source, .. } => match source.status() {
                Some(status) => format!("Catalog search failed (status {status})."),
                None => match source {
                    SearchError::Timeout => "Catalog search timed out.".to_string(),
                    _ => "Catalog search failed.".to_string(),
                },
            },
            ScanError::Cancelled => "Scan cancelled.".to_string(),
            ScanError::Other(_) => "Unexpected error.".to_string(),
        }
    }

    /// One-line description for error logs. Leaves out provider bodies,
    /// which only go to debug.
    pub fn summary(&self) -> String {
        match self {
            ScanError::Search {
                keyword,
                page,
                source,
            } => {
                let cause = match source {
                    SearchError::Status { status, .. } => format!("status {status}"),
                    SearchError::Timeout => "timed out".to_string(),
                    SearchError::Transport(_) => "transport error".to_string(),
                    SearchError::Malformed(_) => "malformed response".to_string(),
                };
                format!("search failed for {keyword:?} page {page}: {cause}")
            }
            other => other.to_string(),
        }
    }
}
