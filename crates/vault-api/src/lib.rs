//! Rust SDK for the HashiCorp Vault logical API.
//!
//! Only the two calls a read-only consumer needs are exposed: listing the keys under a path
//! and reading the secret stored at a path.

mod backends;
mod client;
pub mod error;
mod http_client;
pub mod models;
mod resources;

#[cfg(feature = "reqwest-client")]
pub use backends::ReqwestClient;
#[cfg(feature = "reqwest-client")]
pub use client::Vault;
pub use client::{ClientBuilder, ClientConfig, VaultClient};
pub use error::{HttpClientError, VaultError};
pub use http_client::{HttpClient, HttpRequest, HttpResponse};
pub use resources::LogicalResource;
