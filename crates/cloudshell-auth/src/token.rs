//! Authorization-code exchange against the provider token endpoint
//!
//! The exchange returns the provider's JSON as-is: a body without an
//! `access_token` is a provider-side rejection the gateway relays verbatim,
//! not an error of this crate. Only transport failures and unreadable bodies
//! surface as `Error`.

use serde_json::Value;
use tracing::debug;

use crate::constants::DEFAULT_TOKEN_TTL_SECS;
use crate::error::{Error, Result};

/// Parameters for one authorization-code exchange.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeRequest<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_url: &'a str,
}

/// The parts of a successful token response the gateway persists.
///
/// `expires_in` is a delta in seconds from the response time; the token store
/// turns it into an absolute epoch-millis expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
}

impl TokenGrant {
    /// Extract a grant from a token endpoint body.
    ///
    /// Returns `None` when `access_token` is missing or empty, which is how
    /// the provider signals a failed exchange.
    pub fn from_response(body: &Value) -> Option<Self> {
        let access_token = body.get("access_token")?.as_str()?;
        if access_token.is_empty() {
            return None;
        }
        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        Some(Self {
            access_token: access_token.to_owned(),
            expires_in,
        })
    }
}

/// Exchange an authorization code for tokens.
///
/// Form-encoded POST with `grant_type=authorization_code`. The parsed JSON
/// body is returned regardless of HTTP status so provider errors can be
/// passed through unchanged.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_endpoint: &str,
    request: &ExchangeRequest<'_>,
) -> Result<Value> {
    let response = client
        .post(token_endpoint)
        .form(&[
            ("code", request.code),
            ("client_id", request.client_id),
            ("client_secret", request.client_secret),
            ("redirect_uri", request.redirect_url),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    debug!(%status, "token endpoint responded");

    response
        .json::<Value>()
        .await
        .map_err(|e| Error::TokenEndpoint(format!("status {status}: {e}")))
}
