// Axum request handlers — translate player HTTP requests into session/cache operations.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::config::StreamConfig;
use crate::engine::traits::SwarmEngine;
use crate::error::StreamError;
use crate::janitor::DiskJanitor;
use crate::media::{content_type_for, MediaKind};
use crate::session::SessionRegistry;
use crate::stream::cache::StreamCache;
use crate::stream::range::{self, Resolved, Window};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub cache: Arc<StreamCache>,
    pub janitor: Arc<DiskJanitor>,
}

pub struct StreamServer {
    port: u16,
    state: AppState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    janitor_shutdown: CancellationToken,
}

impl StreamServer {
    /// Start the server on a random local port, returning a handle.
    pub async fn start(engine: Arc<dyn SwarmEngine>, cfg: StreamConfig) -> Result<Self> {
        Self::start_on("127.0.0.1:0", engine, cfg).await
    }

    /// Start the server on `addr`, wiring up the registry, range cache and
    /// janitor from `cfg`.
    pub async fn start_on(
        addr: &str,
        engine: Arc<dyn SwarmEngine>,
        cfg: StreamConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let registry = SessionRegistry::new(engine, cfg.clone());
        let cache = Arc::new(StreamCache::new(cfg.cache_capacity_bytes, cfg.cache_ttl()));
        let janitor = DiskJanitor::new(Arc::clone(&registry), &cfg);

        let janitor_shutdown = CancellationToken::new();
        janitor.spawn_sweeper(cfg.janitor_period(), janitor_shutdown.clone());

        let state = AppState {
            registry,
            cache,
            janitor,
        };

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            port,
            state,
            shutdown_tx: Some(shutdown_tx),
            janitor_shutdown,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    pub fn janitor(&self) -> &Arc<DiskJanitor> {
        &self.state.janitor
    }

    /// Shutdown the server and the janitor sweeper gracefully.
    pub fn shutdown(mut self) {
        self.janitor_shutdown.cancel();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/content/{id}/files", get(files_handler))
        .route(
            "/content/{id}/stream/{file_index}",
            get(stream_handler).head(head_handler),
        )
        .route("/content/{id}/status", get(status_handler))
        .route("/content/{id}", delete(delete_handler))
        .route("/content", get(list_handler).delete(delete_all_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        match self {
            StreamError::InvalidLocator(_) => (StatusCode::BAD_REQUEST, body).into_response(),
            StreamError::UnsatisfiableRange { total } => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{}", total))],
                body,
            )
                .into_response(),
            StreamError::ContentNotFound(_) | StreamError::FileNotFound(_) => {
                (StatusCode::NOT_FOUND, body).into_response()
            }
            StreamError::MetadataTimeout(_) => {
                (StatusCode::GATEWAY_TIMEOUT, body).into_response()
            }
            StreamError::Engine(ref e) => {
                error!("engine failure surfaced: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    index: usize,
    name: String,
    path: String,
    length: u64,
    media_kind: MediaKind,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    downloaded: u64,
    download_speed: u64,
    upload_speed: u64,
    peers: u32,
    progress: f64,
}

/// GET /content/{id}/files — list the content's files, creating the session
/// lazily. This is the keep-alive path: it resets the idle timer.
async fn files_handler(
    State(state): State<AppState>,
    Path(locator): Path<String>,
) -> Result<Response, StreamError> {
    let session = state.registry.get_or_create(&locator).await?;
    let files: Vec<FileEntry> = session
        .files()
        .await?
        .iter()
        .map(|f| FileEntry {
            index: f.index,
            name: f.name.clone(),
            path: f.path.clone(),
            length: f.length,
            media_kind: f.media_kind,
        })
        .collect();
    Ok(Json(files).into_response())
}

/// GET /content/{id}/status — transfer progress snapshot.
async fn status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, StreamError> {
    let session = state
        .registry
        .get(&id)
        .ok_or_else(|| StreamError::ContentNotFound(id))?;
    let p = session.progress();
    Ok(Json(StatusBody {
        downloaded: p.downloaded,
        download_speed: p.download_bps,
        upload_speed: p.upload_bps,
        peers: p.peers,
        progress: p.progress,
    })
    .into_response())
}

/// GET /content/{id}/stream/{file_index} — serve file bytes with Range support.
async fn stream_handler(
    State(state): State<AppState>,
    Path((id, file_index)): Path<(String, usize)>,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let session = state
        .registry
        .get(&id)
        .ok_or_else(|| StreamError::ContentNotFound(id.clone()))?;

    let file = session.file(file_index).await?;
    let total = file.length;
    let content_type = content_type_for(&file.path);

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let resolved = range::resolve(range_header, total)?;

    let (window, status) = match resolved {
        Resolved::Whole => {
            if total == 0 {
                let mut resp_headers = HeaderMap::new();
                resp_headers.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
                resp_headers.insert(header::CONTENT_LENGTH, "0".parse().unwrap());
                resp_headers.insert(header::ACCEPT_RANGES, "bytes".parse().unwrap());
                return Ok((StatusCode::OK, resp_headers, Body::empty()).into_response());
            }
            (Window { start: 0, end: total - 1 }, StatusCode::OK)
        }
        Resolved::Window(w) => (w, StatusCode::PARTIAL_CONTENT),
    };

    debug!(
        "stream request content={} file={} range=[{}, {}] status={}",
        id, file_index, window.start, window.end, status
    );

    let rx = session
        .open_stream(file_index, window, &state.cache)
        .await?;

    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
    resp_headers.insert(
        header::CONTENT_LENGTH,
        window.len().to_string().parse().unwrap(),
    );
    resp_headers.insert(header::ACCEPT_RANGES, "bytes".parse().unwrap());
    if status == StatusCode::PARTIAL_CONTENT {
        let content_range = format!("bytes {}-{}/{}", window.start, window.end, total);
        resp_headers.insert(header::CONTENT_RANGE, content_range.parse().unwrap());
    }

    // Errors past this point cannot change the status line; the connection
    // just terminates.
    let body = Body::from_stream(ReceiverStream::new(rx));
    Ok((status, resp_headers, body).into_response())
}

/// HEAD /content/{id}/stream/{file_index} — headers only; players probe with
/// HEAD before committing to a stream.
async fn head_handler(
    State(state): State<AppState>,
    Path((id, file_index)): Path<(String, usize)>,
    headers: HeaderMap,
) -> Result<Response, StreamError> {
    let session = state
        .registry
        .get(&id)
        .ok_or_else(|| StreamError::ContentNotFound(id))?;

    let file = session.file(file_index).await?;
    let total = file.length;

    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(
        header::CONTENT_TYPE,
        content_type_for(&file.path).parse().unwrap(),
    );
    resp_headers.insert(header::ACCEPT_RANGES, "bytes".parse().unwrap());

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    match range::resolve(range_header, total)? {
        Resolved::Whole => {
            resp_headers.insert(header::CONTENT_LENGTH, total.to_string().parse().unwrap());
            Ok((StatusCode::OK, resp_headers).into_response())
        }
        Resolved::Window(w) => {
            resp_headers.insert(
                header::CONTENT_LENGTH,
                w.len().to_string().parse().unwrap(),
            );
            let content_range = format!("bytes {}-{}/{}", w.start, w.end, total);
            resp_headers.insert(header::CONTENT_RANGE, content_range.parse().unwrap());
            Ok((StatusCode::PARTIAL_CONTENT, resp_headers).into_response())
        }
    }
}

/// GET /content — content-ids with a live session.
async fn list_handler(State(state): State<AppState>) -> Response {
    let mut ids = state.registry.live_ids();
    ids.sort();
    Json(ids).into_response()
}

/// DELETE /content/{id} — tear down the session and delete its artifact.
async fn delete_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let removed = state.janitor.remove_content(&id).await;
    Json(json!({ "removed": removed })).into_response()
}

/// DELETE /content — explicit removal for everything known.
async fn delete_all_handler(State(state): State<AppState>) -> Response {
    let removed = state.janitor.remove_all().await;
    Json(json!({ "removed": removed })).into_response()
}
