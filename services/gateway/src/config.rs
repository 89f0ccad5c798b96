//! Configuration types and loading
//!
//! Non-secret settings come from a TOML file where every section is optional.
//! OAuth client credentials, the key-derivation secret and the SSH public key
//! come only from the environment (CLIENT_ID, CLIENT_SECRET, SECRET_KEY,
//! SSH_PUBLICKEY) so they never end up in a checked-in file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cloudshell_auth::identity::DEFAULT_CLIENT_ADDRESS_HEADER;
use cloudshell_auth::{ClientAddressIdentity, IdentityKey, SharedIdentity};
use common::Secret;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub cloudshell: CloudShellConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(skip)]
    pub credentials: Credentials,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Separate listener for /health and /metrics; disabled when unset.
    #[serde(default)]
    pub admin_listen_addr: Option<SocketAddr>,
    /// Per-call timeout for outbound requests (token endpoint, Cloud Shell API)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Serve /token, /start and /addPublicKey instead of the placeholder.
    #[serde(default)]
    pub lifecycle_routes: bool,
}

/// OAuth provider endpoints
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_authorize_endpoint")]
    pub authorize_endpoint: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    /// Externally visible origin, e.g. `https://shell.example.com`. When unset
    /// the redirect URL is derived from each request's Host header.
    #[serde(default)]
    pub public_url: Option<String>,
}

/// Remote API settings
#[derive(Debug, Deserialize)]
pub struct CloudShellConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    #[default]
    File,
}

/// Token store settings
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStrategy {
    #[default]
    Shared,
    ClientAddress,
}

/// How the token-store key is derived from a request
#[derive(Debug, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub strategy: IdentityStrategy,
    /// Header read by the `client_address` strategy
    #[serde(default = "default_identity_header")]
    pub header: String,
}

/// Secrets resolved from the environment
#[derive(Debug, Default)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub secret_key: Secret<String>,
    pub ssh_public_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin_listen_addr: None,
            timeout_secs: default_timeout(),
            max_connections: default_max_connections(),
            lifecycle_routes: false,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            authorize_endpoint: default_authorize_endpoint(),
            token_endpoint: default_token_endpoint(),
            public_url: None,
        }
    }
}

impl Default for CloudShellConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            strategy: IdentityStrategy::default(),
            header: default_identity_header(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8787))
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

fn default_authorize_endpoint() -> String {
    cloudshell_auth::AUTHORIZE_ENDPOINT.to_string()
}

fn default_token_endpoint() -> String {
    cloudshell_auth::TOKEN_ENDPOINT.to_string()
}

fn default_api_url() -> String {
    cloudshell_api::DEFAULT_API_URL.to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("cloudshell-tokens.json")
}

fn default_identity_header() -> String {
    DEFAULT_CLIENT_ADDRESS_HEADER.to_string()
}

impl Config {
    /// Load configuration from a TOML file, then resolve credentials from the
    /// environment.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.credentials = Credentials::from_env()?;
        Ok(config)
    }

    /// Parse and validate the TOML portion only.
    pub fn parse(contents: &str) -> common::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("oauth.authorize_endpoint", &self.oauth.authorize_endpoint)?;
        require_http_url("oauth.token_endpoint", &self.oauth.token_endpoint)?;
        require_http_url("cloudshell.api_url", &self.cloudshell.api_url)?;
        if let Some(ref public_url) = self.oauth.public_url {
            require_http_url("oauth.public_url", public_url)?;
        }

        if self.server.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.store.backend == StoreBackend::File && self.store.path.as_os_str().is_empty() {
            return Err(common::Error::Config(
                "store.path must be set for the file backend".into(),
            ));
        }

        if self.identity.strategy == IdentityStrategy::ClientAddress {
            ClientAddressIdentity::new(&self.identity.header)
                .map_err(|e| common::Error::Config(e.to_string()))?;
        }

        Ok(())
    }

    /// Build the configured key-derivation strategy.
    pub fn identity_key(&self) -> common::Result<Arc<dyn IdentityKey>> {
        match self.identity.strategy {
            IdentityStrategy::Shared => Ok(Arc::new(SharedIdentity)),
            IdentityStrategy::ClientAddress => ClientAddressIdentity::new(&self.identity.header)
                .map(|s| Arc::new(s) as Arc<dyn IdentityKey>)
                .map_err(|e| common::Error::Config(e.to_string())),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("cloudshell-gateway.toml")
    }
}

impl Credentials {
    /// Read all four required variables; blank values count as missing.
    pub fn from_env() -> common::Result<Self> {
        Ok(Self {
            client_id: required_env("CLIENT_ID")?,
            client_secret: Secret::new(required_env("CLIENT_SECRET")?),
            secret_key: Secret::new(required_env("SECRET_KEY")?),
            ssh_public_key: required_env("SSH_PUBLICKEY")?,
        })
    }
}

fn required_env(name: &'static str) -> common::Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_owned()),
        _ => Err(common::Error::MissingEnv(name)),
    }
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )));
    }
    reqwest::Url::parse(value)
        .map_err(|e| common::Error::Config(format!("{field} is not a valid URL: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 4] = ["CLIENT_ID", "CLIENT_SECRET", "SECRET_KEY", "SSH_PUBLICKEY"];

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    unsafe fn set_all_credentials() {
        unsafe {
            set_env("CLIENT_ID", "cid.apps.googleusercontent.com");
            set_env("CLIENT_SECRET", "csecret");
            set_env("SECRET_KEY", "deployment-secret");
            set_env("SSH_PUBLICKEY", "ssh-ed25519 AAAAC3Nza alice@host");
        }
    }

    unsafe fn clear_credentials() {
        for name in ENV_VARS {
            unsafe { remove_env(name) };
        }
    }

    fn valid_toml() -> &'static str {
        r#"
[server]
listen_addr = "0.0.0.0:8787"
admin_listen_addr = "127.0.0.1:9090"
lifecycle_routes = true

[oauth]
public_url = "https://shell.example.com"

[store]
backend = "memory"

[identity]
strategy = "client_address"
header = "x-forwarded-for"
"#
    }

    #[test]
    fn test_parse_valid_config() {
        let config = Config::parse(valid_toml()).unwrap();
        assert_eq!(config.server.listen_addr.port(), 8787);
        assert_eq!(
            config.server.admin_listen_addr,
            Some("127.0.0.1:9090".parse().unwrap())
        );
        assert!(config.server.lifecycle_routes);
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(
            config.oauth.public_url.as_deref(),
            Some("https://shell.example.com")
        );
        assert_eq!(config.oauth.token_endpoint, cloudshell_auth::TOKEN_ENDPOINT);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.identity.strategy, IdentityStrategy::ClientAddress);
        assert_eq!(config.identity_key().unwrap().id(), "client_address");
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.listen_addr, default_listen_addr());
        assert!(config.server.admin_listen_addr.is_none());
        assert!(!config.server.lifecycle_routes);
        assert_eq!(config.oauth.authorize_endpoint, cloudshell_auth::AUTHORIZE_ENDPOINT);
        assert_eq!(config.cloudshell.api_url, cloudshell_api::DEFAULT_API_URL);
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.store.path, PathBuf::from("cloudshell-tokens.json"));
        assert_eq!(config.identity_key().unwrap().id(), "shared");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::parse("not valid {{{{ toml");
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_invalid_api_url_rejected() {
        let result = Config::parse(
            r#"
[cloudshell]
api_url = "cloudshell.googleapis.com/v1/users/me/environments/default"
"#,
        );
        let err = format!("{}", result.unwrap_err());
        assert!(
            err.contains("cloudshell.api_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_invalid_public_url_rejected() {
        let result = Config::parse(
            r#"
[oauth]
public_url = "shell.example.com"
"#,
        );
        assert!(result.is_err(), "public_url without scheme must be rejected");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::parse("[server]\ntimeout_secs = 0\n");
        assert!(result.is_err(), "timeout_secs = 0 must be rejected");
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let result = Config::parse("[server]\nmax_connections = 0\n");
        assert!(result.is_err(), "max_connections = 0 must be rejected");
    }

    #[test]
    fn test_empty_store_path_rejected() {
        let result = Config::parse("[store]\nbackend = \"file\"\npath = \"\"\n");
        assert!(result.is_err(), "file backend without path must be rejected");
    }

    #[test]
    fn test_invalid_identity_header_rejected() {
        let result = Config::parse(
            r#"
[identity]
strategy = "client_address"
header = "not a header"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_store_backend_rejected() {
        let result = Config::parse("[store]\nbackend = \"redis\"\n");
        assert!(matches!(result, Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_load_reads_credentials_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        unsafe { set_all_credentials() };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.credentials.client_id, "cid.apps.googleusercontent.com");
        assert_eq!(config.credentials.client_secret.expose(), "csecret");
        assert_eq!(config.credentials.secret_key.expose(), "deployment-secret");
        assert_eq!(
            config.credentials.ssh_public_key,
            "ssh-ed25519 AAAAC3Nza alice@host"
        );
        assert_eq!(format!("{:?}", config.credentials.client_secret), "[REDACTED]");
        unsafe { clear_credentials() };
    }

    #[test]
    fn test_missing_credential_is_named() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        unsafe {
            set_all_credentials();
            remove_env("SECRET_KEY");
        }
        let err = Config::load(&path).unwrap_err();
        assert!(
            matches!(err, common::Error::MissingEnv("SECRET_KEY")),
            "got: {err}"
        );
        unsafe { clear_credentials() };
    }

    #[test]
    fn test_blank_credential_counts_as_missing() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe {
            set_all_credentials();
            set_env("CLIENT_SECRET", "   ");
        }
        let err = Credentials::from_env().unwrap_err();
        assert!(matches!(err, common::Error::MissingEnv("CLIENT_SECRET")));
        unsafe { clear_credentials() };
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("cloudshell-gateway.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
