//! HTTP endpoints built on axum.

use crate::catalog::{CatalogCache, CatalogResponse, SystemClock};
use crate::config::FlowliteConfig;
use crate::delivery::{
    clamp_quality, DeliveryKind, DeliveryPipeline, DeliveryRequest, ImageTranscoder,
};
use crate::error::{FlowliteError, RegistryError, Result};
use crate::registry::{FileRegistry, HttpRegistry, RegistrySource};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const X_ORIGINAL_SIZE: HeaderName = HeaderName::from_static("x-original-size");
const X_COMPRESSED_SIZE: HeaderName = HeaderName::from_static("x-compressed-size");
const X_DELETED: HeaderName = HeaderName::from_static("x-deleted");

/// Per-request defaults for omitted query parameters.
#[derive(Debug, Clone, Copy)]
pub struct RequestDefaults {
    pub quality: u8,
    pub delete_after_send: bool,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            quality: 85,
            delete_after_send: true,
        }
    }
}

/// Everything the handlers share.
#[derive(Debug)]
pub struct AppState {
    pub cache: CatalogCache,
    pub pipeline: DeliveryPipeline,
    pub defaults: RequestDefaults,
}

/// Thread-safe shared state for axum handlers.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(cache: CatalogCache, pipeline: DeliveryPipeline, defaults: RequestDefaults) -> Self {
        Self {
            cache,
            pipeline,
            defaults,
        }
    }

    /// Wire up the registry source, cache and pipeline described by `config`.
    pub fn from_config(config: &FlowliteConfig) -> Result<Self> {
        let source = registry_source(config)?;
        let cache = CatalogCache::new(source, Arc::new(SystemClock), config.catalog_ttl());
        let pipeline = DeliveryPipeline::new(
            Arc::new(config.directories.clone()),
            ImageTranscoder::new(config.max_decode_bytes),
        );
        let defaults = RequestDefaults {
            quality: clamp_quality(i64::from(config.jpeg_quality)),
            delete_after_send: config.delete_after_send,
        };
        Ok(Self::new(cache, pipeline, defaults))
    }
}

/// Registry source selected by configuration: a dump file if set, else HTTP.
pub fn registry_source(config: &FlowliteConfig) -> Result<Arc<dyn RegistrySource>> {
    if let Some(path) = &config.registry.file {
        return Ok(Arc::new(FileRegistry::new(path)));
    }
    let base = url::Url::parse(&config.registry.url).map_err(|e| RegistryError::Request {
        message: format!("invalid registry url '{}': {}", config.registry.url, e),
    })?;
    Ok(Arc::new(HttpRegistry::new(&base, config.registry_timeout())?))
}

/// Build an axum Router with `/catalog`, `/image` and `/health` routes.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/catalog", get(catalog_handler))
        .route("/image", get(image_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Mount `router` under `prefix`. An empty prefix or `/` mounts at the root.
pub fn mount(prefix: &str, router: Router) -> Router {
    let prefix = prefix.trim().trim_end_matches('/');
    if prefix.is_empty() {
        return router;
    }
    let prefix = if prefix.starts_with('/') {
        prefix.to_string()
    } else {
        format!("/{}", prefix)
    };
    Router::new().nest(&prefix, router)
}

impl IntoResponse for FlowliteError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = serde_json::json!({
            "ok": false,
            "error": self.client_message(),
        });
        (status, Json(body)).into_response()
    }
}

/// `"1"` is on, anything else is off.
fn flag(value: Option<&str>, default: bool) -> bool {
    match value {
        Some(v) => v.trim() == "1",
        None => default,
    }
}

#[derive(Debug, Default, Deserialize)]
struct CatalogParams {
    refresh: Option<String>,
    debug: Option<String>,
}

#[derive(Serialize)]
struct CatalogBody {
    ok: bool,
    #[serde(flatten)]
    response: CatalogResponse,
}

async fn catalog_handler(
    State(state): State<SharedState>,
    Query(params): Query<CatalogParams>,
) -> Response {
    let refresh = flag(params.refresh.as_deref(), false);
    let debug = flag(params.debug.as_deref(), false);

    match state.cache.get(refresh, debug).await {
        Ok(response) => Json(CatalogBody { ok: true, response }).into_response(),
        Err(e) => FlowliteError::from(e).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ImageParams {
    filename: Option<String>,
    subfolder: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    compress: Option<String>,
    delete: Option<String>,
    quality: Option<String>,
}

impl ImageParams {
    fn into_request(self, defaults: RequestDefaults) -> Result<DeliveryRequest> {
        let filename = self.filename.unwrap_or_default();
        if filename.is_empty() {
            return Err(FlowliteError::MissingFilename);
        }
        let quality = match self.quality.as_deref() {
            Some(raw) => raw.trim().parse::<i64>().map_err(|_| FlowliteError::BadRequest {
                message: format!("quality must be an integer, got '{}'", raw),
            })?,
            None => i64::from(defaults.quality),
        };

        Ok(DeliveryRequest::new(
            DeliveryKind::parse(self.kind.as_deref().unwrap_or("output")),
            self.subfolder.unwrap_or_default(),
            filename,
        )
        .compress(flag(self.compress.as_deref(), true))
        .delete_after(flag(self.delete.as_deref(), defaults.delete_after_send))
        .quality(quality))
    }
}

async fn image_handler(
    State(state): State<SharedState>,
    Query(params): Query<ImageParams>,
) -> Result<Response> {
    let request = params.into_request(state.defaults)?;
    let delivery = state.pipeline.deliver(&request).await?;

    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(delivery.mime)),
        (X_ORIGINAL_SIZE, HeaderValue::from(delivery.original_size)),
        (X_COMPRESSED_SIZE, HeaderValue::from(delivery.compressed_size())),
        (
            X_DELETED,
            HeaderValue::from_static(if delivery.deleted() { "1" } else { "0" }),
        ),
    ];
    Ok((StatusCode::OK, headers, Body::from(delivery.bytes)).into_response())
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "plugin": "flowlite",
    }))
}

/// Serve on the configured address until Ctrl-C.
pub async fn run(state: SharedState, config: &FlowliteConfig) -> std::io::Result<()> {
    let app = mount(&config.route_prefix, router(state));
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        prefix = %config.route_prefix,
        "FlowLite listening: /catalog, /image, /health"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await
}
