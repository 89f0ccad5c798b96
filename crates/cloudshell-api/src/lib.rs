//! Cloud Shell remote API facade
//!
//! Thin request builders for the three environment operations the gateway
//! relays: `GET self`, `POST self:start`, `POST self:addPublicKey`. Each is a
//! single bearer-authenticated call; nothing is cached or retried here.
//!
//! Response shapes are kept close to the wire. `get_status` condenses the
//! environment into a `StatusReport` (the JSON the gateway relays), while
//! `start` and `add_public_key` return the raw body because callers relay it
//! unchanged.

pub mod client;

pub use client::CloudShellClient;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The default environment of the authenticated user.
pub const DEFAULT_API_URL: &str =
    "https://cloudshell.googleapis.com/v1/users/me/environments/default";

/// Lifecycle state of a Cloud Shell environment.
///
/// Unknown values are preserved verbatim so they can be logged and relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnvironmentState {
    Running,
    Suspended,
    Starting,
    Pending,
    Other(String),
}

impl EnvironmentState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "RUNNING",
            Self::Suspended => "SUSPENDED",
            Self::Starting => "STARTING",
            Self::Pending => "PENDING",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for EnvironmentState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "RUNNING" => Self::Running,
            "SUSPENDED" => Self::Suspended,
            "STARTING" => Self::Starting,
            "PENDING" => Self::Pending,
            _ => Self::Other(s),
        }
    }
}

impl From<EnvironmentState> for String {
    fn from(state: EnvironmentState) -> Self {
        match state {
            EnvironmentState::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl std::fmt::Display for EnvironmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of the environment resource the gateway and `gcs` read.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub state: Option<EnvironmentState>,
    #[serde(default)]
    pub ssh_username: Option<String>,
    #[serde(default)]
    pub ssh_host: Option<String>,
    #[serde(default)]
    pub ssh_port: Option<u16>,
}

/// Condensed status relayed by `/status` and consumed by `/connect`.
///
/// Serializes to `{error}`, `{state, sshUsername, sshPort, sshHost}` or
/// `{state}` depending on the variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatusReport {
    Failed {
        error: Value,
    },
    Running {
        state: EnvironmentState,
        #[serde(rename = "sshUsername", skip_serializing_if = "Option::is_none")]
        ssh_username: Option<String>,
        #[serde(rename = "sshPort", skip_serializing_if = "Option::is_none")]
        ssh_port: Option<u16>,
        #[serde(rename = "sshHost", skip_serializing_if = "Option::is_none")]
        ssh_host: Option<String>,
    },
    State {
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<EnvironmentState>,
    },
}

impl StatusReport {
    /// Environment state, if the report carries one.
    pub fn state(&self) -> Option<&EnvironmentState> {
        match self {
            Self::Failed { .. } => None,
            Self::Running { state, .. } => Some(state),
            Self::State { state } => state.as_ref(),
        }
    }
}

impl From<Environment> for StatusReport {
    fn from(env: Environment) -> Self {
        if let Some(error) = env.error {
            return Self::Failed { error };
        }
        match env.state {
            Some(EnvironmentState::Running) => Self::Running {
                state: EnvironmentState::Running,
                ssh_username: env.ssh_username,
                ssh_port: env.ssh_port,
                ssh_host: env.ssh_host,
            },
            state => Self::State { state },
        }
    }
}

/// How a `start` response should be treated by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// Body carried an `error`; relay it.
    Failed(Value),
    /// Long-running operation accepted with `metadata.state == STARTING`.
    Starting,
    /// Anything else.
    Unrecognized,
}

impl StartOutcome {
    pub fn classify(body: &Value) -> Self {
        match body.get("error") {
            Some(error) if !error.is_null() => return Self::Failed(error.clone()),
            _ => {}
        }
        let metadata_state = body
            .get("metadata")
            .and_then(|m| m.get("state"))
            .and_then(Value::as_str);
        if metadata_state == Some("STARTING") {
            Self::Starting
        } else {
            Self::Unrecognized
        }
    }
}

/// Errors from remote API calls. Remote-side rejections arrive as JSON
/// `error` bodies and are not represented here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl Error {
    /// Short label for metrics (`error_type`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Http(_) => "connection",
            Self::Decode(_) => "decode",
        }
    }
}

/// Result alias for remote API operations.
pub type Result<T> = std::result::Result<T, Error>;
