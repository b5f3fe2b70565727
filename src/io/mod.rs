mod atomic;
mod upstream;

pub use atomic::write_atomic;
pub use upstream::{
    create_http_client, HttpUpstream, Upstream, UpstreamResponse, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT,
};
