use crate::{
    config::{parse_number, Config},
    scan::{ScanEvent, ScanParams, Scanner},
};
use axum::{
    extract::{Query, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Json, Router,
};
use futures_util::stream;
use serde::Deserialize;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct SharedState {
    scanner: Scanner,
    config: Arc<Config>,
}

impl SharedState {
    pub fn new(scanner: Scanner, config: Config) -> Self {
        Self {
            scanner,
            config: Arc::new(config),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/scan", get(scan))
        .route("/api/config", get(get_config))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(Arc::new(state))
}

async fn start_app(config: Config, listen: String) -> anyhow::Result<()> {
    let scanner = Scanner::from_config(&config)?;
    let app = router(SharedState::new(scanner, config));

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    log::info!("listening on {listen}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

pub fn start_daemon(config: Config, listen: Option<String>) -> anyhow::Result<()> {
    let listen = listen.unwrap_or_else(|| config.listen.clone());

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(config, listen).await })
}

/// Raw query values; clamping happens in [`ScanParams::clamped`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub pages: Option<String>,
    pub max_per_page: Option<String>,
    pub min_score: Option<String>,
}

impl ScanRequest {
    pub fn params(&self) -> ScanParams {
        ScanParams::clamped(
            parse_number(self.pages.as_deref()),
            parse_number(self.max_per_page.as_deref()),
            parse_number(self.min_score.as_deref()),
        )
    }
}

fn to_sse(event: &ScanEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.name()).json_data(event)
}

/// Streams one scan. Closing the connection cancels the scan.
async fn scan(
    State(state): State<Arc<SharedState>>,
    Query(payload): Query<ScanRequest>,
) -> impl IntoResponse {
    let params = payload.params();
    log::debug!("payload: {payload:?} params: {params:?}");

    let cancel = CancellationToken::new();
    let events = state.scanner.spawn(params, cancel.clone());

    // the guard lives as long as the stream does
    let guard = cancel.drop_guard();
    let stream = stream::unfold((events, guard), |(mut events, guard)| async move {
        let event = events.recv().await?;
        Some((to_sse(&event), (events, guard)))
    });

    (
        [(header::CACHE_CONTROL, "no-cache, no-transform")],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
}

async fn get_config(State(state): State<Arc<SharedState>>) -> Json<Config> {
    Json(state.config.as_ref().clone())
}
