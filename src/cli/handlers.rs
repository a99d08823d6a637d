use std::io::Write;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    scan::{ScanEvent, ScanParams, Scanner},
};

pub fn handle_scan(
    config: &Config,
    pages: Option<u32>,
    max_per_page: Option<usize>,
    min_score: Option<f64>,
) -> Result<()> {
    let params = ScanParams::clamped(
        pages.map(f64::from),
        max_per_page.map(|n| n as f64),
        min_score,
    );
    log::info!(
        "pages={} max_per_page={} min_score={}",
        params.pages_per_keyword,
        params.max_items_per_page,
        params.min_score
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let scanner = Scanner::from_config(config)?;
        let cancel = CancellationToken::new();
        let mut events = scanner.spawn(params, cancel.clone());

        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("interrupted, stopping scan");
                    cancel.cancel();
                }
            }
        });

        let mut stdout = std::io::stdout().lock();
        let mut failure = None;
        while let Some(event) = events.recv().await {
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
            if let ScanEvent::Error { message } = event {
                failure = Some(message);
            }
        }

        match failure {
            Some(message) => bail!(message),
            None => Ok(()),
        }
    })
}
