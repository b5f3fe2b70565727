//! Loop prevention for requests the pipeline issues to itself.
//!
//! The master probe and the derivative fetch both travel back through the
//! same HTTP host that runs the pipeline. Every such URL carries a marker
//! query parameter so the miss handler can tell them apart from client
//! traffic and never start a second generation from them.
//!
//! # Marker Schemes
//!
//! ```text
//! Sentinel:  ?thumb_streamer=thumb_streamer
//! Keyed:     ?thumb_streamer=<hex HMAC-SHA256(secret, path)>
//! ```
//!
//! The keyed scheme binds the marker to the URL path, so a client cannot add
//! it by hand to suppress generation, and a legitimate parameter that happens
//! to share the token name is not mistaken for a marker.
//!
//! # Example
//!
//! ```rust
//! use thumb_streamer::request::LoopGuard;
//! use url::Url;
//!
//! let guard = LoopGuard::keyed("thumb_streamer", "my-secret-key");
//! let url = Url::parse("http://example.com/uploads/a-10x10.jpg").unwrap();
//!
//! let signed = guard.sign(url);
//! assert!(guard.is_signed(signed.as_url().path(), signed.as_url().query()));
//! ```

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use url::{form_urlencoded, Url};

type HmacSha256 = Hmac<Sha256>;

/// Default marker parameter name (and sentinel value).
pub const DEFAULT_LOOP_TOKEN: &str = "thumb_streamer";

#[derive(Clone)]
enum MarkerMode {
    Sentinel,
    Keyed { secret: Vec<u8> },
}

/// A URL that carries the loop-prevention marker.
///
/// Outbound calls only accept this type, so an unmarked self-request cannot
/// be issued by accident.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl(Url);

impl SignedUrl {
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Signs self-issued URLs and recognizes signed inbound requests.
#[derive(Clone)]
pub struct LoopGuard {
    token: String,
    mode: MarkerMode,
}

impl fmt::Debug for LoopGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            MarkerMode::Sentinel => "sentinel",
            MarkerMode::Keyed { .. } => "keyed",
        };
        f.debug_struct("LoopGuard")
            .field("token", &self.token)
            .field("mode", &mode)
            .finish()
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOOP_TOKEN)
    }
}

impl LoopGuard {
    /// Marker whose name and value are both `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            mode: MarkerMode::Sentinel,
        }
    }

    /// Marker whose value is an HMAC of the URL path under `secret`.
    pub fn keyed(token: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        Self {
            token: token.into(),
            mode: MarkerMode::Keyed {
                secret: secret.as_ref().to_vec(),
            },
        }
    }

    /// Name of the marker query parameter.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Attach the marker to `url`, replacing any marker already present.
    pub fn sign(&self, mut url: Url) -> SignedUrl {
        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != self.token.as_str())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        let value = self.marker_value(url.path());

        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &retained {
                pairs.append_pair(key, value);
            }
            pairs.append_pair(&self.token, &value);
        }

        SignedUrl(url)
    }

    /// Check an inbound request (raw path and query) for a valid marker.
    pub fn is_signed(&self, path: &str, query: Option<&str>) -> bool {
        let Some(query) = query else {
            return false;
        };

        form_urlencoded::parse(query.as_bytes())
            .filter(|(key, _)| key == self.token.as_str())
            .any(|(_, value)| self.verify(path, &value))
    }

    fn verify(&self, path: &str, value: &str) -> bool {
        match &self.mode {
            MarkerMode::Sentinel => value == self.token,
            MarkerMode::Keyed { .. } => {
                let Ok(provided) = hex::decode(value) else {
                    return false;
                };
                let Ok(expected) = hex::decode(self.marker_value(path)) else {
                    return false;
                };
                provided.ct_eq(&expected).into()
            }
        }
    }

    fn marker_value(&self, path: &str) -> String {
        match &self.mode {
            MarkerMode::Sentinel => self.token.clone(),
            MarkerMode::Keyed { secret } => {
                let mut mac =
                    HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
                mac.update(path.as_bytes());
                hex::encode(mac.finalize().into_bytes())
            }
        }
    }
}
