//! Google OAuth plumbing for the Cloud Shell gateway
//!
//! Everything the gateway needs to turn a browser visit into a cached bearer
//! token, with no dependency on the HTTP server itself:
//! 1. `/auth` redirects to `authorize::build_authorization_url()`
//! 2. The provider calls back with a code, exchanged via `token::exchange_code()`
//! 3. `identity::IdentityKey` derives the storage key for the caller
//! 4. The access token is written through a `store::TokenStore`
//! 5. Later requests resolve the token with `TokenStore::lookup()`

pub mod authorize;
pub mod constants;
pub mod error;
pub mod file_store;
pub mod identity;
pub mod store;
pub mod token;

pub use authorize::build_authorization_url;
pub use constants::*;
pub use error::{Error, Result};
pub use file_store::FileTokenStore;
pub use identity::{ClientAddressIdentity, IdentityKey, SharedIdentity, encode_key};
pub use store::{CachedToken, MemoryTokenStore, TokenStore, now_millis};
pub use token::{ExchangeRequest, TokenGrant, exchange_code};
