//! HTTP surface: the on-demand image endpoint and the gallery JSON API.
//!
//! ## Routes
//!
//! | Route | Method | Purpose |
//! |---|---|---|
//! | `/api/image` | GET | Content-negotiated image bytes (`src`, `width`, `quality`) |
//! | `/api/photos` | GET | Materialized gallery metadata list |
//! | `/api/photos/optimize` | GET | Derivation status (total / unprocessed / processed) |
//! | `/api/photos/optimize` | POST | Run the batch, or the orphan reaper with `{"cleanup": true}` |
//!
//! ## The image endpoint
//!
//! Format comes from the `Accept` header (AVIF > WebP > JPEG), width is
//! snapped to the nearest supported breakpoint, and lookups go cheapest
//! first: dynamic cache, pre-derived variant, WebP stand-in when AVIF was
//! asked for but not yet derived, and finally a live render persisted into
//! the dynamic cache. The `X-Cache` response header names which path served
//! the request (`HIT` / `PREOPTIMIZED` / `PREOPTIMIZED-WEBP` / `MISS`).
//!
//! Image responses are immutable by construction — a different width,
//! quality, or format is a different URL/ETag — so they carry a one-year
//! `Cache-Control` and a deterministic ETag derived from the cache key.
//!
//! Decode and encode are CPU-bound and run on the blocking pool; the request
//! threads only touch the filesystem through `tokio::fs`.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::batch;
use crate::config::{PhotoDirs, SizeClass};
use crate::derive;
use crate::freshness;
use crate::imaging::{
    fit_width, snap_width, BackendError, ImageBackend, OutputFormat, PixelBackend, Quality,
    RenderParams,
};
use crate::metadata;
use crate::naming;
use crate::reap;

/// Widths a request can resolve to. 1200 fills the gap between the medium
/// and optimized classes for mid-size viewports; it has no pre-derived grid
/// entry and is always served from the dynamic cache.
pub const BREAKPOINTS: &[u32] = &[400, 800, 1200, 1920];

const CACHE_FOREVER: &str = "public, max-age=31536000, immutable";
const CACHE_GALLERY: &str = "public, s-maxage=60, stale-while-revalidate=300";

pub struct AppState {
    pub dirs: PhotoDirs,
    pub backend: PixelBackend,
}

type SharedState = Arc<AppState>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("src is required")]
    MissingSrc,
    #[error("Invalid path")]
    InvalidPath,
    #[error("Image not found")]
    NotFound,
    #[error("Processing failed")]
    Processing(#[source] BackendError),
    #[error("Internal error")]
    Internal(String),
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingSrc | ApiError::InvalidPath => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Processing(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        match &self {
            ApiError::Processing(source) => error!(error = %source, "image processing error"),
            ApiError::Internal(detail) => error!(error = %detail, "internal error"),
            _ => {}
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the application router over a photo tree.
pub fn router(dirs: PhotoDirs) -> Router {
    let state = Arc::new(AppState {
        dirs,
        backend: PixelBackend::new(),
    });
    Router::new()
        .route("/api/image", get(get_image))
        .route("/api/photos", get(get_photos))
        .route("/api/photos/optimize", get(optimize_status).post(run_optimize))
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(dirs: PhotoDirs, addr: SocketAddr) -> std::io::Result<()> {
    dirs.ensure_directories()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, root = %dirs.root().display(), "darkroom listening");
    axum::serve(listener, router(dirs))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    src: Option<String>,
    width: Option<u32>,
    quality: Option<u32>,
}

/// Pick the best format the client accepts: AVIF, then WebP, then the JPEG
/// floor every browser can render.
fn negotiate_format(headers: &HeaderMap) -> OutputFormat {
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if accept.contains("image/avif") {
        OutputFormat::Avif
    } else if accept.contains("image/webp") {
        OutputFormat::Webp
    } else {
        OutputFormat::Jpeg
    }
}

/// Deterministic ETag over the full response identity. The digest is opaque
/// but stable, so clients revalidate across restarts.
pub fn compute_etag(base: &str, width: u32, quality: u32, format: OutputFormat) -> String {
    let digest = Sha256::digest(format!("{base}-{width}-{quality}-{format}").as_bytes());
    format!("\"{:x}\"", digest)
}

fn image_response(mime: &'static str, etag: &str, x_cache: &'static str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (header::CACHE_CONTROL, CACHE_FOREVER.to_string()),
            (header::ETAG, etag.to_string()),
            (HeaderName::from_static("x-cache"), x_cache.to_string()),
        ],
        bytes,
    )
        .into_response()
}

async fn get_image(
    State(state): State<SharedState>,
    Query(query): Query<ImageQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let src = query
        .src
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingSrc)?;

    // Only the final path component counts; `src` may arrive as a full
    // public path like `/assets/photos/dawn.jpg`.
    let filename = Path::new(src)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(ApiError::InvalidPath)?
        .to_string();
    let base = naming::base_name(&filename).to_string();

    let format = negotiate_format(&headers);
    let width = snap_width(query.width.unwrap_or(800), BREAKPOINTS);
    let quality = query
        .quality
        .filter(|q| *q > 0)
        .unwrap_or_else(|| format.default_quality());

    let cache_key = naming::dynamic_cache_key(&base, width, quality, format);
    let cache_path = state.dirs.dynamic_cache_path(&cache_key);
    let etag = compute_etag(&base, width, quality, format);

    // A matching validator only short-circuits while the cached artifact
    // still exists; after an eviction the request falls through and
    // repopulates the cache.
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());
    if if_none_match == Some(etag.as_str())
        && tokio::fs::try_exists(&cache_path).await.unwrap_or(false)
    {
        return Ok((
            StatusCode::NOT_MODIFIED,
            [
                (header::CACHE_CONTROL, CACHE_FOREVER.to_string()),
                (header::ETAG, etag),
            ],
        )
            .into_response());
    }

    // 1. Dynamic cache
    if let Ok(bytes) = tokio::fs::read(&cache_path).await {
        return Ok(image_response(format.mime(), &etag, "HIT", bytes));
    }

    // 2. Pre-derived variant at exactly this width
    if let Some(class) = SizeClass::from_width(width) {
        if format != OutputFormat::Jpeg {
            let pre = state.dirs.variant_path(&base, class, format);
            if let Ok(bytes) = tokio::fs::read(&pre).await {
                return Ok(image_response(format.mime(), &etag, "PREOPTIMIZED", bytes));
            }
        }
        // 3. AVIF negotiated but only WebP derived: same resolution, lesser
        // format — never a silent resolution change.
        if format == OutputFormat::Avif {
            let webp = state.dirs.variant_path(&base, class, OutputFormat::Webp);
            if let Ok(bytes) = tokio::fs::read(&webp).await {
                return Ok(image_response(
                    OutputFormat::Webp.mime(),
                    &etag,
                    "PREOPTIMIZED-WEBP",
                    bytes,
                ));
            }
        }
    }

    // 4. Live derivation from the source file
    let source = state.dirs.source_path(&filename);
    if !source.starts_with(state.dirs.root()) {
        return Err(ApiError::InvalidPath);
    }
    let meta = tokio::fs::metadata(&source)
        .await
        .map_err(|_| ApiError::NotFound)?;
    if !meta.is_file() {
        return Err(ApiError::NotFound);
    }

    let task_state = state.clone();
    let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ApiError> {
        let dims = task_state
            .backend
            .identify(&source)
            .map_err(ApiError::Processing)?;
        let (w, h) = fit_width((dims.width, dims.height), width);
        let bytes = task_state
            .backend
            .render(&RenderParams {
                source,
                width: w,
                height: h,
                format,
                quality: Quality::new(quality),
            })
            .map_err(ApiError::Processing)?;
        std::fs::create_dir_all(task_state.dirs.dynamic_cache_dir())?;
        derive::write_atomic(&cache_path, &bytes)?;
        Ok(bytes)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(image_response(format.mime(), &etag, "MISS", bytes))
}

async fn get_photos(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let task_state = state.clone();
    let images =
        tokio::task::spawn_blocking(move || metadata::gallery_images(&task_state.dirs, &task_state.backend))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [(header::CACHE_CONTROL, CACHE_GALLERY.to_string())],
        Json(images),
    )
        .into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeStatus {
    total: usize,
    unprocessed: usize,
    processed: usize,
    unprocessed_files: Vec<String>,
}

async fn optimize_status(State(state): State<SharedState>) -> Result<Json<OptimizeStatus>, ApiError> {
    let task_state = state.clone();
    let status = tokio::task::spawn_blocking(move || -> Result<OptimizeStatus, std::io::Error> {
        task_state.dirs.ensure_directories()?;
        let all = freshness::list_photo_files(&task_state.dirs);
        let stale = freshness::list_stale(&task_state.dirs);
        Ok(OptimizeStatus {
            total: all.len(),
            unprocessed: stale.len(),
            processed: all.len() - stale.len(),
            unprocessed_files: stale,
        })
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(status))
}

#[derive(Debug, Default, Deserialize)]
struct OptimizeRequest {
    #[serde(default)]
    cleanup: bool,
}

async fn run_optimize(State(state): State<SharedState>, body: Bytes) -> Result<Response, ApiError> {
    // Absent or malformed bodies mean "run the batch" — the UI posts with
    // no payload for the common case.
    let request: OptimizeRequest = serde_json::from_slice(&body).unwrap_or_default();
    let task_state = state.clone();

    if request.cleanup {
        let deleted = tokio::task::spawn_blocking(move || reap::reap_orphans(&task_state.dirs))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??;
        return Ok(Json(serde_json::json!({
            "message": "Cleanup completed",
            "cleanedFiles": deleted,
        }))
        .into_response());
    }

    let report = tokio::task::spawn_blocking(move || {
        batch::process_all(&task_state.dirs, &task_state.backend, |current, total, file| {
            info!(current, total, file, "processing");
        })
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    for failure in &report.errors {
        warn!(file = failure.file.as_str(), error = %failure.error, "batch derivation failed");
    }

    Ok(Json(serde_json::json!({
        "message": "Processing completed",
        "processed": report.processed.len(),
        "errors": report.errors.len(),
        "processedFiles": report.processed,
        "errorDetails": report
            .errors
            .iter()
            .map(|e| serde_json::json!({ "file": e.file, "error": e.error.to_string() }))
            .collect::<Vec<_>>(),
    }))
    .into_response())
}
