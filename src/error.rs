use thiserror::Error;

/// Errors from the outbound HTTP calls the pipeline makes to itself
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Network or connection error (includes timeouts)
    #[error("Connection error: {0}")]
    Connection(String),

    /// The body could not be read to completion
    #[error("Body read error: {0}")]
    Body(String),
}

/// Errors raised by a metadata store lookup
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing manifest could not be read
    #[error("Metadata store I/O error: {0}")]
    Io(String),

    /// The backing manifest is not valid
    #[error("Invalid metadata manifest: {0}")]
    Invalid(String),
}

/// Errors raised by an image codec while producing a derivative
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// The master is smaller than the requested box in at least one dimension
    #[error("Source {source_width}x{source_height} is smaller than requested {width}x{height}")]
    SourceTooSmall {
        source_width: u32,
        source_height: u32,
        width: u32,
        height: u32,
    },

    /// The master format has no encoder (or no decoder)
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Decoding the master failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Encoding the derivative failed
    #[error("Encode error: {0}")]
    Encode(String),

    /// Writing the derivative to storage failed
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Reasons a master image cannot be used
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The candidate URL could not be built
    #[error("Invalid master URL: {0}")]
    InvalidUrl(String),

    /// The existence probe did not return a 2xx status
    #[error("Master probe returned {status}")]
    ProbeStatus { status: u16 },

    /// The existence probe failed at the transport layer
    #[error("Master probe failed: {0}")]
    Probe(#[from] UpstreamError),

    /// The master exists but is not a registered media asset
    #[error("Master not registered: {relative_path}")]
    NotRegistered { relative_path: String },

    /// The metadata store lookup failed
    #[error("Metadata lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Reasons a derivative could not be generated
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    /// The requested box is not allowed by the size policy
    #[error("Size {width}x{height} is not a registered size")]
    SizeNotAllowed { width: u32, height: u32 },

    /// The editor id has no configured resize strategy
    #[error("Unknown editor: {0}")]
    UnknownEditor(String),

    /// The master path escapes the upload root or is empty
    #[error("Invalid master path: {0}")]
    InvalidPath(String),

    /// The codec failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The blocking codec task panicked or was cancelled
    #[error("Generation task failed: {0}")]
    Task(String),
}

/// Reasons the generated derivative could not be streamed back
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// The URL of the generated file could not be built
    #[error("Invalid derivative URL: {0}")]
    InvalidUrl(String),

    /// The fetch failed at the transport layer
    #[error("Derivative fetch failed: {0}")]
    Upstream(#[from] UpstreamError),

    /// The fetch succeeded but returned no bytes
    #[error("Derivative fetch returned an empty body (status {status})")]
    EmptyBody { status: u16 },

    /// The relayed response could not be assembled
    #[error("Invalid response: {0}")]
    Response(String),
}

/// Errors raised while starting the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configuration is invalid
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The metadata manifest could not be loaded
    #[error("Failed to load metadata store: {0}")]
    Store(#[from] StoreError),

    /// The outbound HTTP client could not be built
    #[error("Failed to create HTTP client: {0}")]
    Client(String),

    /// Binding or serving failed
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}
