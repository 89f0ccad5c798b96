//! HTTP client for the environment resource

use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{Environment, Error, Result, StatusReport};

/// Bearer-authenticated client for one environment resource URL.
///
/// Cheap to clone: the underlying `reqwest::Client` is shared. The token is
/// passed per call so concurrent requests never share credentials.
#[derive(Debug, Clone)]
pub struct CloudShellClient {
    http: reqwest::Client,
    api_url: String,
}

impl CloudShellClient {
    pub fn new(http: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// `GET self`, condensed into a `StatusReport`.
    #[instrument(skip_all, fields(op = "get_status"))]
    pub async fn get_status(&self, token: &str) -> Result<StatusReport> {
        let body = self
            .send_json(self.http.get(&self.api_url).bearer_auth(token))
            .await?;
        let env: Environment =
            serde_json::from_value(body).map_err(|e| Error::Decode(e.to_string()))?;
        let report = StatusReport::from(env);
        debug!(state = ?report.state(), "environment status");
        Ok(report)
    }

    /// `POST self:start` with an empty public-key list. Returns the raw body,
    /// normally a long-running operation with `metadata.state`.
    #[instrument(skip_all, fields(op = "start"))]
    pub async fn start(&self, token: &str) -> Result<Value> {
        let url = format!("{}:start", self.api_url);
        let body = serde_json::json!({
            "accessToken": token,
            "publicKeys": [],
        });
        self.send_json(self.http.post(url).bearer_auth(token).json(&body))
            .await
    }

    /// `POST self:addPublicKey` with the given OpenSSH public key.
    #[instrument(skip_all, fields(op = "add_public_key"))]
    pub async fn add_public_key(&self, token: &str, key: &str) -> Result<Value> {
        let url = format!("{}:addPublicKey", self.api_url);
        let body = serde_json::json!({ "key": key });
        self.send_json(self.http.post(url).bearer_auth(token).json(&body))
            .await
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(e.to_string())
            } else {
                Error::Http(e.to_string())
            }
        })?;
        let status = response.status();
        debug!(%status, "cloud shell responded");
        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Decode(format!("status {status}: {e}")))
    }
}
