//! Session bootstrap middleware
//!
//! Runs ahead of every route except `/auth` and `/callback`: derives the
//! caller's storage key, looks up the cached token and either rejects the
//! request with the Unauthenticated envelope or attaches a `Session` to the
//! request extensions. Handlers read the bearer token from that `Session`,
//! so concurrent requests never share credential state.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use cloudshell_auth::{CALLBACK_PATH, now_millis};
use common::Secret;
use tracing::{debug, error};

use crate::AppState;
use crate::error::ApiError;

/// Paths served without a cached token.
const PUBLIC_PATHS: &[&str] = &["/auth", CALLBACK_PATH];

/// Per-request authentication context.
#[derive(Clone, Debug)]
pub struct Session {
    pub token: Arc<Secret<String>>,
}

impl Session {
    pub fn bearer(&self) -> &str {
        self.token.expose()
    }
}

pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

pub async fn bootstrap(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if is_public(request.uri().path()) {
        return next.run(request).await;
    }

    let key = state
        .identity
        .derive(request.headers(), state.secret_key.expose());

    match state.store.lookup(&key, now_millis()).await {
        Ok(Some(token)) => {
            request.extensions_mut().insert(Session {
                token: Arc::new(Secret::new(token)),
            });
            next.run(request).await
        }
        Ok(None) => {
            debug!(identity = state.identity.id(), "no live token for caller");
            ApiError::Unauthenticated.into_response()
        }
        Err(e) => {
            error!(error = %e, store = state.store.id(), "token lookup failed");
            ApiError::Unknown.into_response()
        }
    }
}
