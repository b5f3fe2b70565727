//! Configuration management for thumb-streamer.
//!
//! Settings come from command-line arguments (clap) or from environment
//! variables with the `THUMB_` prefix. Every optional setting has a default.
//!
//! # Commands
//!
//! - `serve` - Run the HTTP host
//! - `generate` - Generate one derivative offline against the upload directory
//!
//! # Environment Variables
//!
//! - `THUMB_HOST` - Server bind address (default: 0.0.0.0)
//! - `THUMB_PORT` - Server port (default: 3000)
//! - `THUMB_UPLOAD_DIR` - Upload directory (required)
//! - `THUMB_UPLOAD_PREFIX` - URL path of the upload directory (default: /uploads)
//! - `THUMB_MANIFEST` - JSON manifest of registered masters (required)
//! - `THUMB_SIZES` - Named sizes, comma-separated `name=WxH`
//! - `THUMB_SIZE_POLICY` - `any` or `registered` (default: any)
//! - `THUMB_EDITORS` - Editor filters, comma-separated `id=filter`
//! - `THUMB_FILTER` - Default resampling filter (default: lanczos3)
//! - `THUMB_JPEG_QUALITY` - JPEG quality of derivatives (default: 82)
//! - `THUMB_LOOP_TOKEN` - Name of the loop-prevention parameter
//! - `THUMB_LOOP_SECRET` - Secret for keyed loop-prevention markers
//! - `THUMB_CONNECT_TIMEOUT_MS` - Self-request connect timeout (default: 2000)
//! - `THUMB_REQUEST_TIMEOUT_SECS` - Self-request timeout (default: 30)
//! - `THUMB_SELF_URL` - Origin of self-requests (default: http://127.0.0.1:<port>)
//! - `THUMB_TRUST_FORWARDED_PROTO` - Take the request scheme from `X-Forwarded-Proto`
//! - `THUMB_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use image::imageops::FilterType;
use url::Url;

use crate::io::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::request::{LoopGuard, DEFAULT_LOOP_TOKEN};
use crate::thumbnail::{
    parse_filter, ImageCrateCodec, NamedSize, SizePolicy, SizeRegistry, DEFAULT_JPEG_QUALITY,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default URL path of the upload directory.
pub const DEFAULT_UPLOAD_PREFIX: &str = "/uploads";

/// Default resampling filter.
pub const DEFAULT_FILTER: &str = "lanczos3";

// =============================================================================
// CLI Arguments
// =============================================================================

/// thumb-streamer - On-demand thumbnail cache.
///
/// Serves an upload directory and generates missing `<name>-WxH.<ext>` crops
/// from their master on first request.
#[derive(Parser, Debug, Clone)]
#[command(name = "thumb-streamer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(ServeConfig),

    /// Generate one derivative from the upload directory and exit.
    Generate(GenerateConfig),
}

/// An editor id bound to a resampling filter, e.g. `2=nearest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSpec {
    pub id: String,
    pub filter: FilterType,
}

impl FromStr for EditorSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, filter) = s
            .split_once('=')
            .ok_or_else(|| format!("expected ID=FILTER, got '{}'", s))?;
        let id = id.trim();

        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("editor id must be numeric, got '{}'", id));
        }

        let filter = parse_filter(filter.trim())
            .ok_or_else(|| format!("unknown filter '{}' for editor {}", filter.trim(), id))?;

        Ok(Self {
            id: id.to_string(),
            filter,
        })
    }
}

impl fmt::Display for EditorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.id, self.filter)
    }
}

/// Settings shared by every command that generates derivatives.
#[derive(Args, Debug, Clone)]
pub struct GenerationArgs {
    /// Directory holding masters and derivatives.
    #[arg(long, env = "THUMB_UPLOAD_DIR")]
    pub upload_dir: PathBuf,

    /// JSON manifest mapping upload-relative master paths to asset ids.
    #[arg(long, env = "THUMB_MANIFEST")]
    pub manifest: PathBuf,

    /// Named size `name=WIDTHxHEIGHT` (repeatable).
    #[arg(long = "size", env = "THUMB_SIZES", value_delimiter = ',')]
    pub sizes: Vec<NamedSize>,

    /// Which requested boxes may be generated.
    #[arg(long, value_enum, default_value_t = SizePolicy::Any, env = "THUMB_SIZE_POLICY")]
    pub size_policy: SizePolicy,

    /// Alternate resize strategy `id=filter` selected by `-e<id>-` (repeatable).
    #[arg(long = "editor", env = "THUMB_EDITORS", value_delimiter = ',')]
    pub editors: Vec<EditorSpec>,

    /// Resampling filter of the default strategy.
    #[arg(long, default_value = DEFAULT_FILTER, env = "THUMB_FILTER")]
    pub filter: String,

    /// JPEG quality of derivatives (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "THUMB_JPEG_QUALITY")]
    pub jpeg_quality: u8,
}

impl GenerationArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.upload_dir.as_os_str().is_empty() {
            return Err(
                "Upload directory is required. Set --upload-dir or THUMB_UPLOAD_DIR".to_string(),
            );
        }

        if parse_filter(&self.filter).is_none() {
            return Err(format!(
                "Unknown filter '{}' (expected nearest, triangle, catmullrom, gaussian or lanczos3)",
                self.filter
            ));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if let Some(size) = self.sizes.iter().find(|s| s.width == 0 || s.height == 0) {
            return Err(format!("size '{}' must have non-zero dimensions", size));
        }

        if self.size_policy == SizePolicy::Registered && self.sizes.is_empty() {
            return Err(
                "size_policy 'registered' needs at least one --size, otherwise nothing can be generated"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Registry built from `--size`.
    pub fn size_registry(&self) -> SizeRegistry {
        SizeRegistry::from_sizes(self.sizes.iter().cloned())
    }

    /// The default codec.
    pub fn codec(&self) -> ImageCrateCodec {
        ImageCrateCodec::new()
            .with_filter(parse_filter(&self.filter).unwrap_or(FilterType::Lanczos3))
            .with_jpeg_quality(self.jpeg_quality)
    }

    /// One codec per `--editor`, named with the editor marker.
    pub fn editor_codecs(&self) -> Vec<(String, ImageCrateCodec)> {
        self.editors
            .iter()
            .map(|editor| {
                let codec = ImageCrateCodec::new()
                    .with_filter(editor.filter)
                    .with_jpeg_quality(self.jpeg_quality)
                    .for_editor(editor.id.clone());
                (editor.id.clone(), codec)
            })
            .collect()
    }
}

/// Configuration for the serve command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "THUMB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "THUMB_PORT")]
    pub port: u16,

    /// URL path under which the upload directory is served.
    #[arg(long, default_value = DEFAULT_UPLOAD_PREFIX, env = "THUMB_UPLOAD_PREFIX")]
    pub upload_prefix: String,

    /// Origin this server is reached at for its own requests.
    ///
    /// Master probes and derivative fetches always go here, never to the
    /// client's Host. Defaults to http://127.0.0.1:<port>.
    #[arg(long, env = "THUMB_SELF_URL")]
    pub self_url: Option<Url>,

    /// Take the request scheme from X-Forwarded-Proto.
    ///
    /// Only enable behind a proxy that sets the header.
    #[arg(long, default_value_t = false, env = "THUMB_TRUST_FORWARDED_PROTO")]
    pub trust_forwarded_proto: bool,

    // =========================================================================
    // Generation Configuration
    // =========================================================================
    #[command(flatten)]
    pub generation: GenerationArgs,

    // =========================================================================
    // Self-request Configuration
    // =========================================================================
    /// Name of the query parameter marking self-issued requests.
    #[arg(long, default_value = DEFAULT_LOOP_TOKEN, env = "THUMB_LOOP_TOKEN")]
    pub loop_token: String,

    /// Secret for HMAC-keyed markers.
    ///
    /// When unset the marker value equals the token name.
    #[arg(long, env = "THUMB_LOOP_SECRET")]
    pub loop_secret: Option<String>,

    /// Connect timeout of self-requests in milliseconds.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT.as_millis() as u64, env = "THUMB_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,

    /// Overall timeout of self-requests in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs(), env = "THUMB_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: u64,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "THUMB_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.generation.validate()?;

        if self.upload_prefix.trim_matches('/').is_empty() {
            return Err("upload_prefix must name a path below the root, e.g. /uploads".to_string());
        }

        let origin = self.self_origin()?;
        if origin.scheme() != "http" && origin.scheme() != "https" {
            return Err("self_url must be an http or https URL".to_string());
        }
        if origin.host_str().is_none() || origin.query().is_some() || origin.fragment().is_some()
        {
            return Err("self_url must be a plain origin, e.g. http://127.0.0.1:3000".to_string());
        }

        if self.loop_token.is_empty() {
            return Err("loop_token must not be empty".to_string());
        }

        if self.loop_secret.as_deref().is_some_and(str::is_empty) {
            return Err("loop_secret must not be empty when set".to_string());
        }

        if self.connect_timeout_ms == 0 {
            return Err("connect_timeout_ms must be greater than 0".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Origin of self-requests.
    ///
    /// The configured `--self-url`, or loopback on the bound port when the
    /// server listens on every interface.
    pub fn self_origin(&self) -> Result<Url, String> {
        if let Some(url) = &self.self_url {
            return Ok(url.clone());
        }

        let host = match self.host.as_str() {
            "" | "0.0.0.0" => "127.0.0.1".to_string(),
            "::" | "[::]" => "[::1]".to_string(),
            h if h.contains(':') && !h.starts_with('[') => format!("[{h}]"),
            h => h.to_string(),
        };

        Url::parse(&format!("http://{}:{}", host, self.port))
            .map_err(|e| format!("cannot derive self origin from {}: {e}", self.bind_address()))
    }

    /// Loop guard for the configured marker.
    pub fn loop_guard(&self) -> LoopGuard {
        match &self.loop_secret {
            Some(secret) => LoopGuard::keyed(&self.loop_token, secret),
            None => LoopGuard::new(&self.loop_token),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Configuration for the generate command.
#[derive(Args, Debug, Clone)]
pub struct GenerateConfig {
    /// Upload-relative derivative path, e.g. `photos/sunset-150x150.jpg`.
    pub path: String,

    #[command(flatten)]
    pub generation: GenerationArgs,

    /// Print the result as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl GenerateConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.generation.validate()?;

        if self.path.trim_matches('/').is_empty() {
            return Err("path must not be empty".to_string());
        }

        Ok(())
    }

    /// The path without a leading `/`.
    pub fn relative_path(&self) -> &str {
        self.path.trim_start_matches('/')
    }
}

// =============================================================================
// Tests
// =============================================================================
