//! Integration tests for the HTTP endpoints.

use axum::body::Body;
use flowlite_core::catalog::{CatalogCache, SystemClock};
use flowlite_core::delivery::{DeliveryPipeline, ImageTranscoder, StaticLayout};
use flowlite_core::registry::StaticRegistry;
use flowlite_core::server::{mount, router, AppState, RequestDefaults, SharedState};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn object_info() -> serde_json::Value {
    json!({
        "CheckpointLoaderSimple": {"input": {"required": {
            "ckpt_name": [["sd_xl_base.safetensors", "sd_xl_base.safetensors"]]
        }}},
        "LoraLoaderModelOnly": {"input": {"required": {
            "lora_name": [["detail.safetensors"]]
        }}},
        "KSampler": {"input": {"required": {
            "sampler_name": [["euler", "dpmpp_2m"]],
            "scheduler": [["normal"]]
        }}}
    })
}

fn png_bytes() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 200, 30, 255]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

struct Fixture {
    dir: TempDir,
    state: SharedState,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let layout = StaticLayout {
            output: dir.path().join("output"),
            input: dir.path().join("input"),
            temp: dir.path().join("temp"),
        };
        for base in [&layout.output, &layout.input, &layout.temp] {
            std::fs::create_dir_all(base).unwrap();
        }
        let cache = CatalogCache::new(
            Arc::new(StaticRegistry::from_value(object_info()).unwrap()),
            Arc::new(SystemClock),
            Duration::from_secs(30),
        );
        let pipeline = DeliveryPipeline::new(Arc::new(layout), ImageTranscoder::default());
        let state = Arc::new(AppState::new(
            cache,
            pipeline,
            RequestDefaults {
                quality: 85,
                delete_after_send: false,
            },
        ));
        Self { dir, state }
    }

    fn output(&self) -> std::path::PathBuf {
        self.dir.path().join("output")
    }

    async fn get(&self, uri: &str) -> axum::http::Response<Body> {
        let req = axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        ServiceExt::<axum::http::Request<Body>>::oneshot(router(Arc::clone(&self.state)), req)
            .await
            .unwrap()
    }

    async fn get_json(&self, uri: &str) -> (axum::http::StatusCode, serde_json::Value) {
        let resp = self.get(uri).await;
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }
}

fn header<'a>(resp: &'a axum::http::Response<Body>, name: &str) -> &'a str {
    resp.headers().get(name).unwrap().to_str().unwrap()
}

fn write(dir: &Path, name: &str, data: &[u8]) {
    std::fs::write(dir.join(name), data).unwrap();
}

// --- /health ---

#[tokio::test]
async fn test_health() {
    let fx = Fixture::new();
    let (status, json) = fx.get_json("/health").await;
    assert_eq!(status, 200);
    assert_eq!(json["ok"], true);
    assert_eq!(json["plugin"], "flowlite");
}

// --- /catalog ---

#[tokio::test]
async fn test_catalog_shape() {
    let fx = Fixture::new();
    let (status, json) = fx.get_json("/catalog").await;
    assert_eq!(status, 200);
    assert_eq!(json["ok"], true);
    assert!(json["ts"].as_f64().unwrap() > 0.0);
    assert_eq!(json["models"]["all"], json!(["sd_xl_base.safetensors"]));
    assert_eq!(json["models"]["ckpt"], json!(["sd_xl_base.safetensors"]));
    assert_eq!(json["models"]["unet"], json!([]));
    assert_eq!(json["loras"], json!(["detail.safetensors"]));
    assert_eq!(json["samplers"], json!(["euler", "dpmpp_2m"]));
    assert_eq!(json["schedulers"], json!(["normal"]));
    assert_eq!(json["vae"], json!([]));
    assert!(json.get("extraction_debug").is_none());
}

#[tokio::test]
async fn test_catalog_cached_between_requests() {
    let fx = Fixture::new();
    let (_, first) = fx.get_json("/catalog").await;
    let (_, second) = fx.get_json("/catalog").await;
    assert_eq!(first["ts"], second["ts"]);
}

#[tokio::test]
async fn test_catalog_debug_on_refresh() {
    let fx = Fixture::new();
    let (status, json) = fx.get_json("/catalog?refresh=1&debug=1").await;
    assert_eq!(status, 200);
    assert_eq!(json["component_count"], 3);
    assert!(json["sample_inputs"].as_array().unwrap().len() <= 3);
    let records = json["extraction_debug"].as_array().unwrap();
    assert!(records.iter().any(|r| r["component"] == "LoraLoaderModelOnly"
        && r["field"] == "lora_name"
        && r["count"] == 1));

    // A cache hit never carries diagnostics
    let (_, cached) = fx.get_json("/catalog?debug=1").await;
    assert!(cached.get("extraction_debug").is_none());
    assert_eq!(cached["ts"], json["ts"]);
}

#[tokio::test]
async fn test_catalog_registry_failure_is_500() {
    let dir = TempDir::new().unwrap();
    let cache = CatalogCache::new(
        Arc::new(flowlite_core::registry::FileRegistry::new(dir.path().join("missing.json"))),
        Arc::new(SystemClock),
        Duration::from_secs(30),
    );
    let pipeline = DeliveryPipeline::new(
        Arc::new(StaticLayout::default()),
        ImageTranscoder::default(),
    );
    let state = Arc::new(AppState::new(cache, pipeline, RequestDefaults::default()));
    let req = axum::http::Request::builder()
        .uri("/catalog")
        .body(Body::empty())
        .unwrap();
    let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(router(state), req)
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["ok"], false);
    assert!(json["error"].as_str().unwrap().contains("Registry error"));
}

// --- /image ---

#[tokio::test]
async fn test_image_missing_filename_is_400() {
    let fx = Fixture::new();
    let (status, json) = fx.get_json("/image").await;
    assert_eq!(status, 400);
    assert_eq!(json["error"], "filename required");

    let (status, _) = fx.get_json("/image?filename=&type=output").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_image_bad_quality_is_400() {
    let fx = Fixture::new();
    write(&fx.output(), "a.png", &png_bytes());
    let (status, _) = fx.get_json("/image?filename=a.png&quality=best").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_image_traversal_is_403() {
    let fx = Fixture::new();
    write(fx.dir.path(), "secret.png", &png_bytes());
    let (status, json) = fx
        .get_json("/image?filename=..%2F..%2Fsecret.png&type=output")
        .await;
    assert_eq!(status, 403);
    assert_eq!(json["error"], "Invalid path");

    let (status, _) = fx
        .get_json("/image?filename=secret.png&subfolder=..&delete=1")
        .await;
    assert_eq!(status, 403);
    assert!(fx.dir.path().join("secret.png").exists());
}

#[tokio::test]
async fn test_image_not_found_is_404() {
    let fx = Fixture::new();
    let (status, json) = fx.get_json("/image?filename=ghost.png").await;
    assert_eq!(status, 404);
    assert_eq!(json["ok"], false);
}

#[tokio::test]
async fn test_image_passthrough_headers() {
    let fx = Fixture::new();
    let png = png_bytes();
    write(&fx.output(), "raw.png", &png);

    let resp = fx.get("/image?filename=raw.png&compress=0&delete=1").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "content-type"), "image/png");
    assert_eq!(header(&resp, "x-original-size"), png.len().to_string());
    assert_eq!(header(&resp, "x-compressed-size"), png.len().to_string());
    assert_eq!(header(&resp, "x-deleted"), "0");
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    assert_eq!(body.as_ref(), png.as_slice());
    assert!(fx.output().join("raw.png").exists());
}

#[tokio::test]
async fn test_image_compress_and_delete() {
    let fx = Fixture::new();
    write(&fx.output(), "gen.png", &png_bytes());

    let resp = fx.get("/image?filename=gen.png&compress=1&delete=1&quality=60").await;
    assert_eq!(resp.status(), 200);
    if ImageTranscoder::codec_available() {
        assert_eq!(header(&resp, "content-type"), "image/jpeg");
        assert_eq!(header(&resp, "x-deleted"), "1");
        assert!(!fx.output().join("gen.png").exists());
    } else {
        assert_eq!(header(&resp, "x-deleted"), "0");
        assert!(fx.output().join("gen.png").exists());
    }
}

#[tokio::test]
async fn test_image_delete_defaults_to_config() {
    let fx = Fixture::new();
    write(&fx.output(), "kept.png", &png_bytes());

    // Fixture disables delete-after-send by default
    let resp = fx.get("/image?filename=kept.png").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(header(&resp, "x-deleted"), "0");
    assert!(fx.output().join("kept.png").exists());
}

#[tokio::test]
async fn test_mount_under_prefix() {
    let fx = Fixture::new();
    let app = mount("/flowlite/", router(Arc::clone(&fx.state)));
    let req = axum::http::Request::builder()
        .uri("/flowlite/health")
        .body(Body::empty())
        .unwrap();
    let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}
