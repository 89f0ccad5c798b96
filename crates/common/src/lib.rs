//! Shared types for the Cloud Shell gateway workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
