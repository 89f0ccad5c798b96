//! Storage-key derivation for cached tokens
//!
//! The key is `base64(caller_identity ++ secret)` with padding removed, so it
//! is safe in any key space that dislikes `=`. Which caller identity feeds
//! the key is a strategy: `SharedIdentity` uses none (every caller shares one
//! cached token), `ClientAddressIdentity` reads a forwarded-address header.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use reqwest::header::{HeaderMap, HeaderName};

use crate::error::{Error, Result};

/// Header carrying the client address when the gateway sits behind Cloudflare.
pub const DEFAULT_CLIENT_ADDRESS_HEADER: &str = "cf-connecting-ip";

/// Strategy for turning an inbound request into a token-store key.
pub trait IdentityKey: Send + Sync {
    /// Identifier for logging (e.g. "shared", "client_address")
    fn id(&self) -> &str;

    /// The caller identity component extracted from request headers.
    fn caller_identity(&self, headers: &HeaderMap) -> String;

    /// Derive the storage key for this request. Deterministic, infallible.
    fn derive(&self, headers: &HeaderMap, secret: &str) -> String {
        encode_key(&self.caller_identity(headers), secret)
    }
}

/// Encode a caller identity and deployment secret into a storage key.
pub fn encode_key(caller_identity: &str, secret: &str) -> String {
    let mut raw = String::with_capacity(caller_identity.len() + secret.len());
    raw.push_str(caller_identity);
    raw.push_str(secret);
    STANDARD_NO_PAD.encode(raw.as_bytes())
}

/// Ignores the caller entirely; the key depends on the secret alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SharedIdentity;

impl IdentityKey for SharedIdentity {
    fn id(&self) -> &str {
        "shared"
    }

    fn caller_identity(&self, _headers: &HeaderMap) -> String {
        String::new()
    }
}

/// Scopes tokens per client address read from a request header.
///
/// Proxy headers such as `X-Forwarded-For` may carry a list; only the first
/// (originating) entry is used. A missing header yields the empty identity.
#[derive(Debug, Clone)]
pub struct ClientAddressIdentity {
    header: HeaderName,
}

impl ClientAddressIdentity {
    pub fn new(header: &str) -> Result<Self> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| Error::InvalidHeader(format!("{header}: {e}")))?;
        Ok(Self { header })
    }
}

impl IdentityKey for ClientAddressIdentity {
    fn id(&self) -> &str {
        "client_address"
    }

    fn caller_identity(&self, headers: &HeaderMap) -> String {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_owned())
            .unwrap_or_default()
    }
}
