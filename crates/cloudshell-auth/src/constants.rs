//! Google OAuth and Cloud Shell constants
//!
//! Endpoints are defaults only; the gateway config can point them elsewhere
//! (tests run against local mock servers).

/// Google's OAuth 2.0 authorization endpoint
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Token endpoint for the authorization-code exchange
pub const TOKEN_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v4/token";

/// The only scope the gateway ever requests.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Path the provider redirects back to after consent
pub const CALLBACK_PATH: &str = "/callback";

/// TTL applied when the token response omits `expires_in`
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
