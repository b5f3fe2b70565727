//! End-to-end tests of the miss pipeline over a real loopback server.
//!
//! Tests verify:
//! - A miss generates the derivative, stores it and answers 200
//! - Later requests are static hits and never regenerate
//! - Marked self-requests, oversize boxes, malformed paths and unregistered
//!   masters all pass through as 404 without writing anything

use reqwest::StatusCode;

use thumb_streamer::{SizePolicy, DEFAULT_LOOP_TOKEN};

use super::test_utils::{
    dimensions, write_master, write_png_master, RecordingServer, ServerOptions, TestServer,
};

async fn sunset_server() -> TestServer {
    let server = TestServer::start(ServerOptions::new().register("photos/sunset.jpg", "42")).await;
    write_master(server.dir(), "photos/sunset.jpg", 400, 300);
    server
}

// =============================================================================
// Generation
// =============================================================================

#[tokio::test]
async fn test_miss_generates_and_streams() {
    let server = sunset_server().await;

    let response = server.get("photos/sunset-150x150.jpg").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");

    let body = response.bytes().await.unwrap();
    assert!(!body.is_empty());
    assert_eq!(dimensions(&body), (150, 150));

    let stored = server.dir().join("photos/sunset-150x150.jpg");
    assert!(stored.exists());
    assert_eq!(std::fs::read(stored).unwrap(), body.to_vec());
    assert_eq!(server.codec.calls(), 1);
}

#[tokio::test]
async fn test_second_request_is_static_hit() {
    let server = sunset_server().await;

    let first = server.get("photos/sunset-150x150.jpg").await;
    let first = first.bytes().await.unwrap();
    let second = server.get("photos/sunset-150x150.jpg").await;

    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.bytes().await.unwrap(), first);
    assert_eq!(server.codec.calls(), 1);
}

#[tokio::test]
async fn test_regeneration_is_byte_identical() {
    let server = sunset_server().await;
    let stored = server.dir().join("photos/sunset-120x80.jpg");

    let first = server.get("photos/sunset-120x80.jpg").await;
    let first = first.bytes().await.unwrap();
    std::fs::remove_file(&stored).unwrap();

    let second = server.get("photos/sunset-120x80.jpg").await;
    let second = second.bytes().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(server.codec.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_misses() {
    let server = sunset_server().await;
    let url = server.upload_url("photos/sunset-200x100.jpg");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let client = server.client.clone();
            let url = url.clone();
            tokio::spawn(async move {
                let response = client.get(url).send().await.unwrap();
                let status = response.status();
                let body = response.bytes().await.unwrap();
                (status, body)
            })
        })
        .collect();

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert!(!body.is_empty());
        assert_eq!(dimensions(&body), (200, 100));
    }

    assert!(server.codec.calls() >= 1);
    assert_eq!(
        dimensions(&std::fs::read(server.dir().join("photos/sunset-200x100.jpg")).unwrap()),
        (200, 100)
    );
}

#[tokio::test]
async fn test_png_keeps_content_type() {
    let server = TestServer::start(ServerOptions::new().register("icons/logo.png", "3")).await;
    write_png_master(server.dir(), "icons/logo.png", 64, 64);

    let response = server.get("icons/logo-32x32.png").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(dimensions(&response.bytes().await.unwrap()), (32, 32));
}

#[tokio::test]
async fn test_percent_encoded_name() {
    let server =
        TestServer::start(ServerOptions::new().register("photos/my sunset.jpg", "9")).await;
    write_master(server.dir(), "photos/my sunset.jpg", 200, 200);

    let response = server.get("photos/my%20sunset-100x100.jpg").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(server.dir().join("photos/my sunset-100x100.jpg").exists());
}

#[tokio::test]
async fn test_master_is_served_directly() {
    let server = sunset_server().await;

    let response = server.get("photos/sunset.jpg").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(dimensions(&response.bytes().await.unwrap()), (400, 300));
    assert_eq!(server.codec.calls(), 0);
}

// =============================================================================
// Editors and Size Policy
// =============================================================================

#[tokio::test]
async fn test_editor_derivative() {
    let server = TestServer::start(
        ServerOptions::new()
            .register("photos/sunset.jpg", "42")
            .editor("2"),
    )
    .await;
    write_master(server.dir(), "photos/sunset.jpg", 400, 300);

    let response = server.get("photos/sunset-e2-100x100.jpg").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(server.dir().join("photos/sunset-e2-100x100.jpg").exists());
    // The default codec is not involved
    assert_eq!(server.codec.calls(), 0);
}

#[tokio::test]
async fn test_unbound_editor_uses_default_codec() {
    let server = sunset_server().await;

    let first = server.get("photos/sunset-e2-150x150.jpg").await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(dimensions(&first.bytes().await.unwrap()), (150, 150));
    assert!(server.dir().join("photos/sunset-e2-150x150.jpg").exists());

    let second = server.get("photos/sunset-e2-150x150.jpg").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(server.codec.calls(), 1);
}

#[tokio::test]
async fn test_registered_policy() {
    let server = TestServer::start(
        ServerOptions::new()
            .register("photos/sunset.jpg", "42")
            .size("thumbnail=150x150")
            .policy(SizePolicy::Registered),
    )
    .await;
    write_master(server.dir(), "photos/sunset.jpg", 400, 300);

    let allowed = server.get("photos/sunset-150x150.jpg").await;
    assert_eq!(allowed.status(), StatusCode::OK);

    let denied = server.get("photos/sunset-100x100.jpg").await;
    assert_eq!(denied.status(), StatusCode::NOT_FOUND);
    assert!(!server.dir().join("photos/sunset-100x100.jpg").exists());
    assert_eq!(server.codec.calls(), 1);
}

// =============================================================================
// Pass-through
// =============================================================================

#[tokio::test]
async fn test_marked_request_never_generates() {
    let server = sunset_server().await;
    let marker = format!("{0}={0}", DEFAULT_LOOP_TOKEN);

    let response = server
        .get(&format!("photos/sunset-150x150.jpg?{}", marker))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.codec.calls(), 0);
    assert!(!server.dir().join("photos/sunset-150x150.jpg").exists());
}

#[tokio::test]
async fn test_marked_request_for_existing_file_is_static() {
    let server = sunset_server().await;
    server.get("photos/sunset-150x150.jpg").await;
    assert_eq!(server.codec.calls(), 1);

    let marker = format!("{0}={0}", DEFAULT_LOOP_TOKEN);
    let response = server
        .get(&format!("photos/sunset-150x150.jpg?{}", marker))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.codec.calls(), 1);
}

#[tokio::test]
async fn test_keyed_marker_cannot_be_forged() {
    let server = TestServer::start(
        ServerOptions::new()
            .register("photos/sunset.jpg", "42")
            .loop_secret("s3cret"),
    )
    .await;
    write_master(server.dir(), "photos/sunset.jpg", 400, 300);

    // A hand-written sentinel marker does not suppress generation
    let marker = format!("{0}={0}", DEFAULT_LOOP_TOKEN);
    let response = server
        .get(&format!("photos/sunset-150x150.jpg?{}", marker))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.codec.calls(), 1);
}

#[tokio::test]
async fn test_foreign_host_header_never_receives_self_requests() {
    let server = sunset_server().await;
    let foreign = RecordingServer::start().await;

    let response = server
        .client
        .get(server.upload_url("photos/sunset-150x150.jpg"))
        .header("host", foreign.addr.to_string())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(dimensions(&response.bytes().await.unwrap()), (150, 150));
    assert!(foreign.seen().is_empty());
    assert_eq!(server.codec.calls(), 1);
}

#[tokio::test]
async fn test_non_canonical_size_spelling_never_generates() {
    let server = sunset_server().await;

    for path in [
        "photos/sunset-120X80.jpg",
        "photos/sunset-0120x80.jpg",
        "photos/sunset-120X80.jpg",
        "photos/sunset-0120x80.jpg",
    ] {
        let response = server.get(path).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }

    assert_eq!(server.codec.calls(), 0);
    assert!(!server.dir().join("photos/sunset-120x80.jpg").exists());
}

#[tokio::test]
async fn test_box_larger_than_master() {
    let server = sunset_server().await;

    let response = server.get("photos/sunset-800x800.jpg").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!server.dir().join("photos/sunset-800x800.jpg").exists());
}

#[tokio::test]
async fn test_malformed_size_passes_through() {
    let server = sunset_server().await;
    write_master(server.dir(), "photos/x.jpg", 100, 100);

    let response = server.get("photos/x-abcxdef.jpg").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json: serde_json::Value = serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
    assert_eq!(json["error"], "not_found");
    assert_eq!(server.codec.calls(), 0);
}

#[tokio::test]
async fn test_unregistered_master() {
    let server = sunset_server().await;
    write_master(server.dir(), "photos/stray.jpg", 400, 300);

    let response = server.get("photos/stray-150x150.jpg").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!server.dir().join("photos/stray-150x150.jpg").exists());
    assert_eq!(server.codec.calls(), 0);
}

#[tokio::test]
async fn test_missing_master() {
    let server = TestServer::start(ServerOptions::new().register("photos/gone.jpg", "5")).await;

    let response = server.get("photos/gone-150x150.jpg").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.codec.calls(), 0);
}
