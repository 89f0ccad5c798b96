//! Client for a running cloudshell-gateway
//!
//! The gateway holds the OAuth token; this side only needs its base URL.
//! Every response is classified into a `Reply` so callers never look at raw
//! status codes.

use cloudshell_api::{Environment, EnvironmentState, StartOutcome};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Gateway response, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// No cached token at the gateway, or the upstream rejected it
    Unauthorized,
    /// Relayed upstream `error` object
    Failed(Value),
    /// Environment status (`/status`, or `/connect` on a non-suspended environment)
    Environment(Environment),
    /// Start operation accepted (`/connect` on a suspended environment)
    Started,
    /// Any other JSON body
    Unrecognized(Value),
}

impl Reply {
    pub fn classify(status: StatusCode, body: Value) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            return Self::Unauthorized;
        }
        match body.get("error") {
            Some(error) if !error.is_null() => {
                return if error.get("code").and_then(Value::as_u64) == Some(401) {
                    Self::Unauthorized
                } else {
                    Self::Failed(error.clone())
                };
            }
            _ => {}
        }
        if StartOutcome::classify(&body) == StartOutcome::Starting {
            return Self::Started;
        }
        match serde_json::from_value::<Environment>(body.clone()) {
            Ok(env) if env.state.is_some() => Self::Environment(env),
            _ => Self::Unrecognized(body),
        }
    }

    /// Environment state, when the reply carries one.
    pub fn state(&self) -> Option<&EnvironmentState> {
        match self {
            Self::Environment(env) => env.state.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base: String,
}

impl GatewayClient {
    pub fn new(http: reqwest::Client, base: &str) -> Result<Self> {
        let url = Url::parse(base).map_err(|e| Error::InvalidUrl {
            url: base.to_owned(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::InvalidUrl {
                url: base.to_owned(),
                reason: "scheme must be http or https".into(),
            });
        }
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_owned(),
        })
    }

    /// Page that starts the OAuth consent flow.
    pub fn auth_url(&self) -> String {
        format!("{}/auth", self.base)
    }

    /// POST /connect: status, starting the environment when suspended.
    pub async fn connect(&self) -> Result<Reply> {
        let url = format!("{}/connect", self.base);
        self.send("/connect", self.http.post(url)).await
    }

    /// GET /status
    pub async fn status(&self) -> Result<Reply> {
        let url = format!("{}/status", self.base);
        self.send("/status", self.http.get(url)).await
    }

    /// GET /addPublicKey?key=... (needs `lifecycle_routes` on the gateway)
    pub async fn add_public_key(&self, key: &str) -> Result<Reply> {
        let mut url = Url::parse(&format!("{}/addPublicKey", self.base)).map_err(|e| {
            Error::InvalidUrl {
                url: self.base.clone(),
                reason: e.to_string(),
            }
        })?;
        url.query_pairs_mut().append_pair("key", key);
        self.send("/addPublicKey", self.http.get(url)).await
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> Result<Reply> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        debug!(path, %status, "gateway responded");

        let body: Value = serde_json::from_str(&text).map_err(|_| Error::NotJson {
            path: path.to_owned(),
            body: text.chars().take(200).collect(),
        })?;
        Ok(Reply::classify(status, body))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    /// Scripted gateway: answers every request with the next queued reply,
    /// repeating the last one once the queue runs dry.
    pub(crate) struct MockGateway {
        replies: Mutex<VecDeque<(u16, String)>>,
        last: Mutex<(u16, String)>,
        pub(crate) calls: AtomicUsize,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl MockGateway {
        pub(crate) fn new(replies: Vec<(u16, Value)>) -> Arc<Self> {
            Self::with_raw(
                replies
                    .into_iter()
                    .map(|(status, body)| (status, body.to_string()))
                    .collect(),
            )
        }

        pub(crate) fn with_raw(replies: Vec<(u16, String)>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                last: Mutex::new((500, "{}".into())),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn next(&self) -> (u16, String) {
            let mut last = self.last.lock().unwrap();
            if let Some(reply) = self.replies.lock().unwrap().pop_front() {
                *last = reply;
            }
            last.clone()
        }
    }

    pub(crate) async fn start_mock_gateway(mock: Arc<MockGateway>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let app = axum::Router::new().fallback(move |request: Request<Body>| {
                let mock = mock.clone();
                async move {
                    mock.calls.fetch_add(1, Ordering::SeqCst);
                    mock.requests.lock().unwrap().push(format!(
                        "{} {}",
                        request.method(),
                        request.uri()
                    ));
                    let (status, body) = mock.next();
                    (axum::http::StatusCode::from_u16(status).unwrap(), body)
                }
            });
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}")
    }

    pub(crate) fn client(base: &str) -> GatewayClient {
        GatewayClient::new(reqwest::Client::new(), base).unwrap()
    }

    #[test]
    fn unauthenticated_envelope_is_unauthorized() {
        let body = json!({ "error": { "code": 401, "status": "UNAUTHENTICATED" } });
        assert_eq!(
            Reply::classify(StatusCode::UNAUTHORIZED, body.clone()),
            Reply::Unauthorized
        );
        // Upstream 401 relayed with a different transport status
        assert_eq!(Reply::classify(StatusCode::OK, body), Reply::Unauthorized);
    }

    #[test]
    fn other_errors_are_failed() {
        let error = json!({ "code": 403, "status": "PERMISSION_DENIED" });
        assert_eq!(
            Reply::classify(StatusCode::FORBIDDEN, json!({ "error": error.clone() })),
            Reply::Failed(error)
        );
    }

    #[test]
    fn start_operation_is_started() {
        let body = json!({ "name": "operations/start", "metadata": { "state": "STARTING" } });
        assert_eq!(Reply::classify(StatusCode::OK, body), Reply::Started);
    }

    #[test]
    fn status_bodies_are_environments() {
        let reply = Reply::classify(
            StatusCode::OK,
            json!({ "state": "RUNNING", "sshUsername": "me", "sshHost": "h", "sshPort": 6000 }),
        );
        assert_eq!(reply.state(), Some(&EnvironmentState::Running));
        let Reply::Environment(env) = reply else {
            panic!("expected environment");
        };
        assert_eq!(env.ssh_port, Some(6000));

        assert_eq!(
            Reply::classify(StatusCode::OK, json!({ "state": "SUSPENDED" })).state(),
            Some(&EnvironmentState::Suspended)
        );
    }

    #[test]
    fn stateless_bodies_are_unrecognized() {
        let body = json!({ "done": true });
        assert_eq!(
            Reply::classify(StatusCode::OK, body.clone()),
            Reply::Unrecognized(body)
        );
    }

    #[test]
    fn base_url_must_be_http() {
        assert!(GatewayClient::new(reqwest::Client::new(), "ftp://gw").is_err());
        assert!(GatewayClient::new(reqwest::Client::new(), "not a url").is_err());
        assert_eq!(client("http://gw:8787/").auth_url(), "http://gw:8787/auth");
    }

    #[tokio::test]
    async fn connect_posts_to_gateway() {
        let mock = MockGateway::new(vec![(200, json!({ "state": "RUNNING" }))]);
        let base = start_mock_gateway(mock.clone()).await;

        let reply = client(&base).connect().await.unwrap();
        assert_eq!(reply.state(), Some(&EnvironmentState::Running));
        assert_eq!(mock.requests.lock().unwrap().as_slice(), ["POST /connect"]);
    }

    #[tokio::test]
    async fn add_public_key_sends_encoded_key() {
        let mock = MockGateway::new(vec![(200, json!({ "name": "operations/add" }))]);
        let base = start_mock_gateway(mock.clone()).await;

        client(&base)
            .add_public_key("ssh-ed25519 AAAA me@laptop")
            .await
            .unwrap();
        let requests = mock.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        let url = Url::parse(&format!("http://gw{}", &requests[0]["GET ".len()..])).unwrap();
        assert_eq!(url.path(), "/addPublicKey");
        assert_eq!(
            url.query_pairs().into_owned().collect::<Vec<_>>(),
            vec![("key".to_string(), "ssh-ed25519 AAAA me@laptop".to_string())]
        );
    }

    #[tokio::test]
    async fn placeholder_body_is_not_json() {
        let mock = MockGateway::with_raw(vec![(200, "Hello, World!".into())]);
        let base = start_mock_gateway(mock).await;

        let err = client(&base).add_public_key("ssh-rsa AAAA").await.unwrap_err();
        assert!(matches!(err, Error::NotJson { ref path, ref body }
            if path == "/addPublicKey" && body == "Hello, World!"));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_http_error() {
        let err = client("http://127.0.0.1:1").status().await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
