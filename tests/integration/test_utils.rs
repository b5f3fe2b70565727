//! Test utilities for integration tests.
//!
//! Provides fixture masters, a codec that counts its calls, and a server
//! bound to a real loopback port so self-requests travel through the same
//! router as client requests.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::Uri;
use image::imageops::FilterType;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

use thumb_streamer::error::CodecError;
use thumb_streamer::{
    create_http_client, create_router, HttpUpstream, ImageCodec, ImageCrateCodec, LoopGuard,
    MasterResolver, MemoryMetadataStore, NamedSize, Pipeline, ResponseStreamer, RouterConfig,
    SizePolicy, SizeRegistry, ThumbnailGenerator, DEFAULT_LOOP_TOKEN,
};

pub const UPLOAD_PREFIX: &str = "/uploads";

// =============================================================================
// Fixture Masters
// =============================================================================

/// Write an RGB gradient master under `upload_dir`, creating parent directories.
pub fn write_master(upload_dir: &Path, relative: &str, width: u32, height: u32) -> PathBuf {
    let path = upload_dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }

    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    img.save(&path).unwrap();
    path
}

/// Write a translucent PNG master.
pub fn write_png_master(upload_dir: &Path, relative: &str, width: u32, height: u32) -> PathBuf {
    let path = upload_dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }

    RgbaImage::from_pixel(width, height, Rgba([40, 80, 120, 160]))
        .save(&path)
        .unwrap();
    path
}

/// Dimensions of an encoded image.
pub fn dimensions(bytes: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(bytes).expect("response should be a decodable image");
    (img.width(), img.height())
}

// =============================================================================
// Counting Codec
// =============================================================================

/// Wraps a codec and counts how often it runs, editor variants included.
pub struct CountingCodec {
    inner: ImageCrateCodec,
    calls: Arc<AtomicUsize>,
}

impl CountingCodec {
    pub fn new(inner: ImageCrateCodec) -> Self {
        Self {
            inner,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageCodec for CountingCodec {
    fn resize(
        &self,
        source: &Path,
        width: u32,
        height: u32,
        crop: bool,
    ) -> Result<String, CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resize(source, width, height, crop)
    }

    fn editor_variant(&self, editor_id: &str) -> Option<Arc<dyn ImageCodec>> {
        Some(Arc::new(CountingCodec {
            inner: self.inner.clone().for_editor(editor_id),
            calls: Arc::clone(&self.calls),
        }))
    }
}

// =============================================================================
// Test Server
// =============================================================================

/// Options for [`TestServer::start`].
#[derive(Default)]
pub struct ServerOptions {
    entries: Vec<(String, String)>,
    sizes: Vec<NamedSize>,
    policy: SizePolicy,
    editors: Vec<String>,
    loop_secret: Option<String>,
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a master in the metadata store.
    pub fn register(mut self, relative_path: &str, id: &str) -> Self {
        self.entries.push((relative_path.to_string(), id.to_string()));
        self
    }

    pub fn size(mut self, spec: &str) -> Self {
        self.sizes.push(spec.parse().unwrap());
        self
    }

    pub fn policy(mut self, policy: SizePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bind editor `id` to a nearest-neighbour codec.
    pub fn editor(mut self, id: &str) -> Self {
        self.editors.push(id.to_string());
        self
    }

    pub fn loop_secret(mut self, secret: &str) -> Self {
        self.loop_secret = Some(secret.to_string());
        self
    }
}

/// A running server over a temporary upload directory.
pub struct TestServer {
    pub base_url: String,
    pub upload_dir: TempDir,
    pub codec: Arc<CountingCodec>,
    pub client: reqwest::Client,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(options: ServerOptions) -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let origin = Url::parse(&format!("http://{}", addr)).unwrap();

        let client = create_http_client(Duration::from_secs(2), Duration::from_secs(30)).unwrap();
        let upstream = Arc::new(HttpUpstream::new(client.clone()));

        let guard = match &options.loop_secret {
            Some(secret) => LoopGuard::keyed(DEFAULT_LOOP_TOKEN, secret),
            None => LoopGuard::default(),
        };

        let store = options
            .entries
            .iter()
            .fold(MemoryMetadataStore::new(), |store, (path, id)| {
                store.with_entry(path.as_str(), id.as_str())
            });

        let codec = Arc::new(CountingCodec::new(ImageCrateCodec::new()));
        let mut generator = ThumbnailGenerator::new(upload_dir.path(), codec.clone()).with_sizes(
            Arc::new(SizeRegistry::from_sizes(options.sizes)),
            options.policy,
        );
        for id in &options.editors {
            let editor = ImageCrateCodec::new()
                .with_filter(FilterType::Nearest)
                .for_editor(id.as_str());
            generator = generator.with_editor(id.as_str(), Arc::new(editor));
        }

        let pipeline = Pipeline::new(
            MasterResolver::new(upstream.clone(), Arc::new(store), guard.clone()),
            generator,
            ResponseStreamer::new(upstream),
            guard,
        );

        let router = create_router(
            pipeline,
            RouterConfig::new(UPLOAD_PREFIX, upload_dir.path(), origin).with_tracing(false),
        );

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            upload_dir,
            codec,
            client,
            handle,
        }
    }

    pub fn dir(&self) -> &Path {
        self.upload_dir.path()
    }

    /// Absolute URL of an upload-relative path (may include a query).
    pub fn upload_url(&self, relative: &str) -> String {
        format!("{}{}/{}", self.base_url, UPLOAD_PREFIX, relative)
    }

    pub async fn get(&self, relative: &str) -> reqwest::Response {
        self.client.get(self.upload_url(relative)).send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// =============================================================================
// Foreign Host
// =============================================================================

/// A server that records every request it receives and answers with junk.
pub struct RecordingServer {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl RecordingServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let recorder = Arc::clone(&seen);
        let router = axum::Router::new().fallback(move |uri: Uri| {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().unwrap().push(uri.to_string());
                "not an image"
            }
        });

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, seen, handle }
    }

    /// Request targets received so far.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for RecordingServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
