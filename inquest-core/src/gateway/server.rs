//! HTTP gateway built on axum.
//!
//! Each request runs in its own spawned task that writes into an
//! [`EventSink`]; the response body drains the sink through an
//! [`OutputMultiplexer`]. The body owns a drop guard on the run's
//! cancellation token, so a client hanging up cancels in-flight model and
//! search calls.

use super::request::{ApiError, ChatRequestBody, FormatQuery, ResearchRequestBody};
use crate::brain::LlmProvider;
use crate::chat::run_chat;
use crate::config::InquestConfig;
use crate::error::ResearchError;
use crate::mux::{EventSink, OutputMultiplexer, WireFormat};
use crate::research::{Markers, ResearchEngine, RunRecord};
use crate::search::SearchAdapter;
use crate::types::{RunEvent, Stage, StreamEvent};
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::convert::Infallible;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Everything a request handler needs.
pub struct GatewayState {
    provider: Arc<dyn LlmProvider>,
    search: SearchAdapter,
    config: InquestConfig,
    runs_dir: Option<PathBuf>,
    started_at: chrono::DateTime<chrono::Utc>,
}

/// Shared gateway reference for axum handlers.
pub type SharedGateway = Arc<GatewayState>;

impl GatewayState {
    pub fn new(provider: Arc<dyn LlmProvider>, search: SearchAdapter, config: InquestConfig) -> Self {
        Self {
            provider,
            search,
            config,
            runs_dir: None,
            started_at: chrono::Utc::now(),
        }
    }

    /// Persist a record of every research run under `dir`.
    pub fn with_runs_dir(mut self, dir: PathBuf) -> Self {
        self.runs_dir = Some(dir);
        self
    }

    pub fn config(&self) -> &InquestConfig {
        &self.config
    }

    fn markers(&self) -> Markers {
        Markers {
            open: self.config.research.open_marker.clone(),
            close: self.config.research.close_marker.clone(),
        }
    }

    fn multiplexer(&self, format: WireFormat) -> OutputMultiplexer {
        OutputMultiplexer::with_markers(
            format,
            self.config.research.open_marker.as_str(),
            self.config.research.close_marker.as_str(),
        )
    }
}

/// Build the gateway router.
pub fn router(shared: SharedGateway) -> Router {
    Router::new()
        .route("/api/research", post(research_handler))
        .route("/api/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared)
}

async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    let uptime = (chrono::Utc::now() - gw.started_at).num_seconds();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": gw.provider.model_name(),
        "search": gw.search.provider_name(),
        "uptime_secs": uptime,
    }))
}

async fn research_handler(
    State(gw): State<SharedGateway>,
    query: Result<Query<FormatQuery>, QueryRejection>,
    body: Result<Json<ResearchRequestBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request = body.validate(&gw.config.research)?;
    let format = query.format.unwrap_or(gw.config.server.wire_format);
    info!(topic = %request.topic, breadth = request.breadth, depth = request.depth, %format, "Research request accepted");

    let cancel = CancellationToken::new();
    let (sink, rx) = EventSink::channel(256, cancel.clone());
    let engine = ResearchEngine::new(
        gw.provider.clone(),
        gw.search.clone(),
        gw.config.research.clone(),
    )
    .with_results_per_query(gw.config.search.results_per_query);
    let mut record = RunRecord::start(&request, gw.provider.model_name());
    let runs_dir = gw.runs_dir.clone();

    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        match engine.run(&request, &sink, &task_cancel).await {
            Ok(summary) => record.complete(&summary),
            Err(ResearchError::Cancelled) => {
                info!(run = %record.id, "Research run cancelled");
                record.cancel();
            }
            Err(e) => {
                error!(run = %record.id, error = %e, "Research run failed");
                record.fail(e.to_string());
                let _ = sink
                    .emit(RunEvent::new(Stage::Report, StreamEvent::Error(e.to_string())))
                    .await;
            }
        }
        if let Some(dir) = runs_dir
            && let Err(e) = record.save(&dir)
        {
            warn!(run = %record.id, error = %e, "Failed to save run record");
        }
    });

    Ok(stream_response(rx, gw.multiplexer(format), cancel.drop_guard()))
}

async fn chat_handler(
    State(gw): State<SharedGateway>,
    query: Result<Query<FormatQuery>, QueryRejection>,
    body: Result<Json<ChatRequestBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let messages = body.validate()?;
    let format = query.format.unwrap_or(WireFormat::Markers);

    let cancel = CancellationToken::new();
    let (sink, rx) = EventSink::channel(256, cancel.clone());
    let provider = gw.provider.clone();
    let markers = gw.markers();
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = run_chat(provider, markers, messages, &sink, &task_cancel).await {
            info!(error = %e, "Chat reply stopped");
        }
    });

    Ok(stream_response(rx, gw.multiplexer(format), cancel.drop_guard()))
}

/// Turn a run's event receiver into a streaming HTTP response.
fn stream_response(
    rx: mpsc::Receiver<RunEvent>,
    mux: OutputMultiplexer,
    guard: DropGuard,
) -> Response {
    let content_type = mux.format().content_type();
    let stream = futures::stream::unfold(Some((rx, mux, guard)), |state| async move {
        let (mut rx, mut mux, guard) = state?;
        match rx.recv().await {
            Some(event) => {
                let chunk = Bytes::from(mux.encode(&event));
                Some((Ok::<_, Infallible>(chunk), Some((rx, mux, guard))))
            }
            None => {
                // The run finished on its own; nothing left to cancel.
                let _ = guard.disarm();
                Some((Ok(Bytes::from(mux.finish())), None))
            }
        }
    });

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

/// Serve the gateway on the configured address until `shutdown` resolves.
pub async fn run<F>(shared: SharedGateway, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!(
        "{}:{}",
        shared.config.server.host, shared.config.server.port
    );
    let app = router(shared);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
