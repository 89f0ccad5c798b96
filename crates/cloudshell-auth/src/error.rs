//! Error types for OAuth and token store operations

/// Errors from OAuth and token store operations.
///
/// Provider-side rejections (`invalid_grant` and friends) are not errors here:
/// the token endpoint's JSON is returned to the caller for relaying.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token endpoint returned an unreadable body: {0}")]
    TokenEndpoint(String),

    #[error("invalid identity header: {0}")]
    InvalidHeader(String),

    #[error("token store parse error: {0}")]
    StoreParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
