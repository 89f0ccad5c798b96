use std::time::Duration;

/// Errors surfaced by the `gcs` client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid gateway URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("gateway request failed: {0}")]
    Http(String),

    #[error("gateway answered {path} with a non-JSON body: {body}")]
    NotJson { path: String, body: String },

    #[error("environment not ready after {0:?}")]
    WaitTimeout(Duration),

    #[error("environment is running but reported no SSH {0}")]
    MissingEndpoint(&'static str),

    #[error("failed to run ssh: {0}")]
    Ssh(String),
}

pub type Result<T> = std::result::Result<T, Error>;
