//! Error envelopes returned to HTTP callers
//!
//! Two local kinds with fixed bodies, plus pass-through of upstream errors.
//! The transport status always matches the envelope's `code`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

/// Per-request failure rendered as `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// No live cached token for the caller's key
    Unauthenticated,
    /// Unrecognized upstream shape or a failure with nothing to relay
    Unknown,
    /// `error` object from the Cloud Shell API, relayed unchanged
    Upstream(Value),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(error) => error_code_status(error).unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }

    pub fn body(&self) -> Value {
        match self {
            Self::Unauthenticated => json!({
                "error": { "code": 401, "status": "UNAUTHENTICATED" }
            }),
            Self::Unknown => json!({
                "error": { "code": 500, "status": "ERROR" }
            }),
            Self::Upstream(error) => json!({ "error": error }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(self.body())).into_response()
    }
}

/// HTTP status for a provider body relayed verbatim (e.g. a failed token
/// exchange): `error.code` when usable, else `fallback`.
pub fn relay_status(body: &Value, fallback: StatusCode) -> StatusCode {
    body.get("error")
        .and_then(error_code_status)
        .unwrap_or(fallback)
}

/// `code` of an upstream error object, if it is an HTTP error status.
fn error_code_status(error: &Value) -> Option<StatusCode> {
    let code = error.get("code")?.as_u64()?;
    let code = u16::try_from(code).ok()?;
    StatusCode::from_u16(code)
        .ok()
        .filter(|s| s.is_client_error() || s.is_server_error())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_envelope_is_fixed() {
        let err = ApiError::Unauthenticated;
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            err.body(),
            json!({"error": {"code": 401, "status": "UNAUTHENTICATED"}})
        );
    }

    #[test]
    fn unknown_envelope_is_fixed() {
        let err = ApiError::Unknown;
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.body(), json!({"error": {"code": 500, "status": "ERROR"}}));
    }

    #[test]
    fn upstream_error_status_follows_code() {
        let upstream = json!({"code": 403, "message": "denied", "status": "PERMISSION_DENIED"});
        let err = ApiError::Upstream(upstream.clone());
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.body(), json!({"error": upstream}));
    }

    #[test]
    fn upstream_error_without_usable_code_is_bad_gateway() {
        assert_eq!(
            ApiError::Upstream(json!({"status": "ERROR"})).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Upstream(json!({"code": 200})).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::Upstream(json!("invalid_grant")).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn relay_status_reads_nested_code() {
        let body = json!({"error": {"code": 401, "status": "UNAUTHENTICATED"}});
        assert_eq!(
            relay_status(&body, StatusCode::BAD_REQUEST),
            StatusCode::UNAUTHORIZED
        );
        let oauth_style = json!({"error": "invalid_grant", "error_description": "Bad Request"});
        assert_eq!(
            relay_status(&oauth_style, StatusCode::BAD_REQUEST),
            StatusCode::BAD_REQUEST
        );
    }
}
