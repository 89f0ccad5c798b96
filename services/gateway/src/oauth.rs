//! `/auth` and `/callback`: the two routes that run without a session
//!
//! `/auth` sends the browser to the provider's consent page. `/callback`
//! exchanges the returned code and caches the access token under the
//! caller's derived key. Both compute the redirect URL the same way so the
//! provider sees a matching `redirect_uri` on both legs.

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use cloudshell_auth::{
    CALLBACK_PATH, CLOUD_PLATFORM_SCOPE, ExchangeRequest, TokenGrant, build_authorization_url,
    exchange_code, now_millis,
};
use common::Secret;
use reqwest::Url;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::AppState;
use crate::error::{ApiError, relay_status};
use crate::metrics;

const CALLBACK_SUCCESS: &str = "Authorization successful. You can now close the page.";
const CALLBACK_MISSING_CODE: &str = "Invalid authorization code.";

/// OAuth client settings resolved at startup.
#[derive(Debug)]
pub struct OAuthSettings {
    pub authorize_endpoint: Url,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Configured external origin, if any
    pub public_url: Option<String>,
    /// Origin used when the request carries no Host header
    pub fallback_origin: String,
}

impl OAuthSettings {
    /// `<origin>/callback`, where the origin is the configured public URL or
    /// the one the request was addressed to.
    pub fn redirect_url(&self, headers: &HeaderMap) -> String {
        let origin = match self.public_url {
            Some(ref public_url) => public_url.trim_end_matches('/').to_owned(),
            None => request_origin(headers).unwrap_or_else(|| self.fallback_origin.clone()),
        };
        format!("{origin}{CALLBACK_PATH}")
    }
}

fn request_origin(headers: &HeaderMap) -> Option<String> {
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| *v == "http" || *v == "https")
        .unwrap_or("http");
    Some(format!("{scheme}://{host}"))
}

/// GET /auth: 302 to the provider authorization URL. Incoming query
/// parameters are ignored.
pub async fn authorize(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let redirect_url = state.oauth.redirect_url(&headers);
    let url = build_authorization_url(
        &state.oauth.authorize_endpoint,
        &state.oauth.client_id,
        &redirect_url,
        CLOUD_PLATFORM_SCOPE,
    );
    info!(redirect_url, "redirecting to authorization endpoint");
    (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
}

/// GET /callback?code=...: exchange the code and cache the token.
///
/// Success is plain text for the browser. A provider response without an
/// `access_token` is relayed verbatim and nothing is stored.
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        warn!("callback without authorization code");
        return (StatusCode::BAD_REQUEST, CALLBACK_MISSING_CODE).into_response();
    };

    let redirect_url = state.oauth.redirect_url(&headers);
    let request = ExchangeRequest {
        code: &code,
        client_id: &state.oauth.client_id,
        client_secret: state.oauth.client_secret.expose(),
        redirect_url: &redirect_url,
    };

    let body = match exchange_code(&state.http, &state.oauth.token_endpoint, &request).await {
        Ok(body) => body,
        Err(e) => {
            error!(error = %e, "token exchange failed");
            metrics::record_token_exchange("failed");
            metrics::record_upstream_error("token_endpoint");
            return ApiError::Unknown.into_response();
        }
    };

    let Some(grant) = TokenGrant::from_response(&body) else {
        warn!(response = %body, "token endpoint returned no access_token");
        metrics::record_token_exchange("rejected");
        return (
            relay_status(&body, StatusCode::BAD_REQUEST),
            axum::Json(body),
        )
            .into_response();
    };

    let key = state.identity.derive(&headers, state.secret_key.expose());
    if let Err(e) = state
        .store
        .store(&key, &grant.access_token, grant.expires_in, now_millis())
        .await
    {
        error!(error = %e, store = state.store.id(), "failed to persist access token");
        metrics::record_token_exchange("failed");
        return ApiError::Unknown.into_response();
    }

    info!(
        expires_in = grant.expires_in,
        identity = state.identity.id(),
        "access token cached"
    );
    metrics::record_token_exchange("stored");
    (StatusCode::OK, CALLBACK_SUCCESS).into_response()
}
