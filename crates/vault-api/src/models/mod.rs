//! Wire models for Vault responses.

mod secret;

pub use secret::{ErrorResponse, SecretData, SecretResponse};
