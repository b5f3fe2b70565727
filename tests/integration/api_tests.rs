//! API integration tests driven through the router without a socket.
//!
//! Tests verify:
//! - Health and sizes endpoints
//! - JSON 404 for unknown routes and pass-through misses
//! - Static hits under the upload prefix

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use url::Url;

use thumb_streamer::{
    create_http_client, create_router, HttpUpstream, ImageCrateCodec, LoopGuard, MasterResolver,
    MemoryMetadataStore, NamedSize, Pipeline, ResponseStreamer, RouterConfig, SizePolicy,
    SizeRegistry, ThumbnailGenerator, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};

use super::test_utils::write_master;

fn router(upload_dir: &std::path::Path, sizes: Vec<NamedSize>, policy: SizePolicy) -> axum::Router {
    let client = create_http_client(DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT).unwrap();
    let upstream = Arc::new(HttpUpstream::new(client));
    let guard = LoopGuard::default();

    let pipeline = Pipeline::new(
        MasterResolver::new(
            upstream.clone(),
            Arc::new(MemoryMetadataStore::new()),
            guard.clone(),
        ),
        ThumbnailGenerator::new(upload_dir, Arc::new(ImageCrateCodec::new()))
            .with_sizes(Arc::new(SizeRegistry::from_sizes(sizes)), policy),
        ResponseStreamer::new(upstream),
        guard,
    );

    create_router(
        pipeline,
        RouterConfig::new(
            "/uploads",
            upload_dir,
            Url::parse("http://127.0.0.1:3000").unwrap(),
        )
        .with_tracing(false),
    )
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path(), Vec::new(), SizePolicy::Any);

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_sizes_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let sizes = vec![
        "thumbnail=150x150".parse().unwrap(),
        "medium=300x200".parse().unwrap(),
    ];
    let router = router(dir.path(), sizes, SizePolicy::Registered);

    let request = Request::builder()
        .uri("/sizes")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["policy"], "registered");

    let sizes = json["sizes"].as_array().unwrap();
    assert_eq!(sizes.len(), 2);
    assert_eq!(sizes[0]["name"], "medium");
    assert_eq!(sizes[0]["width"], 300);
    assert_eq!(sizes[1]["name"], "thumbnail");
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path(), Vec::new(), SizePolicy::Any);

    let request = Request::builder()
        .uri("/nope")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_static_hit() {
    let dir = tempfile::tempdir().unwrap();
    write_master(dir.path(), "photos/sunset.jpg", 40, 30);
    let router = router(dir.path(), Vec::new(), SizePolicy::Any);

    let request = Request::builder()
        .uri("/uploads/photos/sunset.jpg")
        .header("host", "example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
}

#[tokio::test]
async fn test_non_derivative_miss_is_json_404() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path(), Vec::new(), SizePolicy::Any);

    let request = Request::builder()
        .uri("/uploads/photos/x-abcxdef.jpg")
        .header("host", "example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("/uploads/photos/x-abcxdef.jpg"));
}

#[tokio::test]
async fn test_marked_miss_is_json_404() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path(), Vec::new(), SizePolicy::Any);

    let request = Request::builder()
        .uri("/uploads/photos/a-10x10.jpg?thumb_streamer=thumb_streamer")
        .header("host", "example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
