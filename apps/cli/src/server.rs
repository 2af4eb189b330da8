//! HTTP surface: `POST /generate-blog` streams progress as server-sent events.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use color_eyre::eyre::{Result, WrapErr};
use futures::StreamExt;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use chatscribe_core::Pipeline;
use chatscribe_transcript::PageFetcher;

#[derive(Clone)]
pub(crate) struct AppState {
    pipeline: Pipeline,
    fetcher: Arc<dyn PageFetcher>,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    url: String,
}

pub(crate) fn router(pipeline: Pipeline, fetcher: Arc<dyn PageFetcher>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generate-blog", post(generate_blog))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pipeline, fetcher })
}

/// Bind and serve until the process is stopped.
pub(crate) async fn serve(
    host: &str,
    port: u16,
    pipeline: Pipeline,
    fetcher: Arc<dyn PageFetcher>,
) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .wrap_err_with(|| format!("invalid bind address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;

    info!(%addr, "chatscribe server listening");
    println!("chatscribe listening on http://{addr}");
    axum::serve(listener, router(pipeline, fetcher))
        .await
        .wrap_err("server shutdown")?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// One run per request. A client disconnect drops the body stream, which
/// cancels the run.
async fn generate_blog(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> impl IntoResponse {
    info!(url = %request.url, "generate-blog request");
    let frames = state
        .pipeline
        .run_url(state.fetcher.clone(), request.url)
        .map(|event| Ok::<_, Infallible>(event.to_sse_frame()));

    (
        [(CONTENT_TYPE, "text/event-stream"), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(frames),
    )
}
