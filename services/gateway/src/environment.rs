//! Session-protected routes backed by the Cloud Shell API
//!
//! Every handler here runs after `session::bootstrap`, so a `Session` is
//! always present in the request extensions.

use axum::Extension;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use cloudshell_api::StatusReport;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::AppState;
use crate::connect::{ConnectAction, ConnectReply, on_started, on_status};
use crate::error::ApiError;
use crate::metrics;
use crate::session::Session;

/// Body for any path without a handler of its own.
pub const PLACEHOLDER: &str = "Hello, World!";

pub async fn placeholder() -> &'static str {
    PLACEHOLDER
}

/// GET /status: relay the condensed environment status.
pub async fn status(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    match state.api.get_status(session.bearer()).await {
        Ok(StatusReport::Failed { error }) => ApiError::Upstream(error).into_response(),
        Ok(report) => axum::Json(report).into_response(),
        Err(e) => upstream_failure(e),
    }
}

/// GET /connect: check the environment and start it if suspended.
pub async fn connect(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    let report = match state.api.get_status(session.bearer()).await {
        Ok(report) => report,
        Err(e) => return upstream_failure(e),
    };

    let reply = match on_status(report) {
        ConnectAction::Reply(reply) => reply,
        ConnectAction::StartEnvironment => {
            info!("environment suspended, starting");
            match state.api.start(session.bearer()).await {
                Ok(body) => on_started(body),
                Err(e) => return upstream_failure(e),
            }
        }
    };

    match reply {
        ConnectReply::RelayStatus(report) => axum::Json(report).into_response(),
        ConnectReply::RelayStart(body) => axum::Json(body).into_response(),
        ConnectReply::RelayError(error) => ApiError::Upstream(error).into_response(),
        ConnectReply::Unknown(reason) => {
            warn!(reason, "connect could not classify upstream response");
            ApiError::Unknown.into_response()
        }
    }
}

/// GET /token (lifecycle routes only): a session exists.
pub async fn token() -> Response {
    axum::Json(json!({ "state": "true" })).into_response()
}

/// GET /start (lifecycle routes only): start the environment unconditionally.
pub async fn start(State(state): State<AppState>, Extension(session): Extension<Session>) -> Response {
    match state.api.start(session.bearer()).await {
        Ok(body) => relay_body(body),
        Err(e) => upstream_failure(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct AddPublicKeyQuery {
    key: Option<String>,
}

/// GET /addPublicKey (lifecycle routes only): register `?key=` or, when
/// absent, the configured key.
pub async fn add_public_key(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Query(query): Query<AddPublicKeyQuery>,
) -> Response {
    let key = query
        .key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .unwrap_or(&*state.ssh_public_key);
    match state.api.add_public_key(session.bearer(), key).await {
        Ok(body) => relay_body(body),
        Err(e) => upstream_failure(e),
    }
}

/// Relay a raw API body, lifting an `error` object into the envelope so the
/// transport status matches.
fn relay_body(body: Value) -> Response {
    match body.get("error") {
        Some(error) if !error.is_null() => ApiError::Upstream(error.clone()).into_response(),
        _ => axum::Json(body).into_response(),
    }
}

fn upstream_failure(e: cloudshell_api::Error) -> Response {
    error!(error = %e, kind = e.kind(), "cloud shell request failed");
    metrics::record_upstream_error(e.kind());
    ApiError::Unknown.into_response()
}
