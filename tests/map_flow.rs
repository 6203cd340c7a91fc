use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use clipmap::core::config::AppConfig;
use clipmap::core::redact::Redacted;
use clipmap::core::types::Manifest;
use clipmap::delivery::router::{build_router, AppState};
use clipmap::mapping::MapEngine;
use clipmap::storage::local_signer::{verify_signature, LocalUrlSigner};
use clipmap::storage::memory::InMemoryObjectStore;

const STANDARD: &str = r"(240|360|424|480|720|1080)p(\.mp4|[a-z0-9_-]{37}\.(vtt|srt))$";
const HD: &str = r"((720|1080)p\.mp4)|(\.(vtt|srt))$";

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.mapping.bucket = "media".to_string();
    config.mapping.map_prefix = "/map/".to_string();
    config.mapping.regex_filter = STANDARD.to_string();
    config.mapping.regex_hd_filter = HD.to_string();
    config.mapping.extra_prefixes = vec!["subtitles/".to_string()];
    config.mapping.extra_resources_param = "extra".to_string();
    config.storage.backend = "memory".to_string();
    config
}

async fn store() -> InMemoryObjectStore {
    let store = InMemoryObjectStore::new("media").with_page_size(2);
    store
        .put_objects([
            "videos/asset123_360p.mp4",
            "videos/asset123_480p.mp4",
            "videos/asset123_720p.mp4",
            "videos/asset123_1080p.mp4",
            "videos/asset123_thumb.jpg",
            "videos/asset123/nested_720p.mp4",
            "subtitles/asset123_en.vtt",
            "subtitles/asset123_480p-0f8fad5b-d9cb-469f-a165-70867728950e.vtt",
        ])
        .await;
    store
}

fn app(config: &AppConfig, store: InMemoryObjectStore) -> Router {
    config.validate().unwrap();
    let engine = MapEngine::new(config, store, LocalUrlSigner::new("https://media.example.com")).unwrap();
    build_router(AppState::new(engine, &config.mapping.map_prefix))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string());
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, content_type, body)
}

#[tokio::test]
async fn test_standard_manifest() {
    let (status, content_type, body) = get(app(&config(), store().await), "/map/videos/asset123").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/json"));
    let manifest: Manifest = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        manifest.paths(),
        vec![
            "/media/videos/asset123_1080p.mp4",
            "/media/videos/asset123_360p.mp4",
            "/media/videos/asset123_480p.mp4",
            "/media/videos/asset123_720p.mp4",
            "/media/subtitles/asset123_480p-0f8fad5b-d9cb-469f-a165-70867728950e.vtt",
        ]
    );
}

#[tokio::test]
async fn test_wire_shape() {
    let (_, _, body) = get(app(&config(), store().await), "/map/videos/asset123__HD").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "sequences": [
                {"clips": [{"type": "source", "path": "/media/videos/asset123_1080p.mp4"}]},
                {"clips": [{"type": "source", "path": "/media/videos/asset123_720p.mp4"}]},
                {"clips": [{"type": "source", "path": "/media/subtitles/asset123_480p-0f8fad5b-d9cb-469f-a165-70867728950e.vtt"}]},
                {"clips": [{"type": "source", "path": "/media/subtitles/asset123_en.vtt"}]},
            ]
        })
    );
}

#[tokio::test]
async fn test_extra_resources_and_percent_decoding() {
    let mut cfg = config();
    cfg.mapping.extra_prefixes.clear();
    let store = InMemoryObjectStore::new("media");
    store.put_object("videos/my asset_480p.mp4", 1).await;

    let (status, _, body) = get(
        app(&cfg, store),
        "/map/videos/my%20asset?extra=%2Fads%2Fpre.mp4,,%2Fads%2Fpost.mp4",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let manifest: Manifest = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        manifest.paths(),
        vec!["/media/videos/my asset_480p.mp4", "/ads/pre.mp4", "/ads/post.mp4"]
    );
}

#[tokio::test]
async fn test_signed_manifest_verifies() {
    let mut cfg = config();
    cfg.signer.access_id = "svc@proj".to_string();
    cfg.signer.private_key = Redacted::new("c2VjcmV0IQ==".to_string());

    let (status, _, body) = get(
        app(&cfg, store().await),
        "/map/videos/asset123__HD?extra=/ads/pre.mp4",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let manifest: Manifest = serde_json::from_slice(&body).unwrap();
    let paths = manifest.paths();
    assert_eq!(paths.len(), 5);
    assert_eq!(paths[4], "/ads/pre.mp4");

    let signed = &paths[0];
    assert!(signed.starts_with("/media/videos/asset123_1080p.mp4?GoogleAccessId=svc%40proj&Expires="));
    let query = signed.split_once('?').unwrap().1;
    let params: std::collections::HashMap<String, String> =
        url::form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    let expires: i64 = params["Expires"].parse().unwrap();
    assert!(verify_signature(
        b"secret!",
        "GET",
        expires,
        "media",
        "videos/asset123_1080p.mp4",
        &params["Signature"],
    ));
}

#[tokio::test]
async fn test_listing_failures_recover_within_retry_budget() {
    let store = store().await;
    store.inject_failures(4);

    let (status, _, body) = get(app(&config(), store), "/map/videos/asset123__HD").await;
    assert_eq!(status, StatusCode::OK);
    let manifest: Manifest = serde_json::from_slice(&body).unwrap();
    assert_eq!(manifest.len(), 4);
}

#[tokio::test]
async fn test_exhausted_retries_return_500_with_message() {
    let store = store().await;
    store.inject_failures(5);

    let (status, content_type, body) = get(app(&config(), store), "/map/videos/asset123").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(content_type.unwrap().starts_with("text/plain"));
    let message = String::from_utf8(body).unwrap();
    assert!(message.contains("videos/asset123"));
    assert!(message.contains("injected failure"));
}

#[tokio::test]
async fn test_errors_and_routing() {
    let (status, _, body) = get(app(&config(), store().await), "/map/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, b"prefix cannot be empty");

    let (status, _, _) = get(app(&config(), store().await), "/nothing/here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = get(app(&config(), store().await), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());

    let response = app(&config(), store().await)
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/map/videos/asset123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_unmatched_prefix_gives_empty_manifest() {
    let (status, _, body) = get(app(&config(), store().await), "/map/videos/unknown").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, br#"{"sequences":[]}"#);
}
