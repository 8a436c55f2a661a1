//! The remote secret store capability consumed by the node layer.

use std::future::Future;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use vault_api::{HttpClient, HttpClientError, VaultClient, VaultError};

pub use vault_api::models::SecretData;

/// Errors surfaced by a [`SecretStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store call cancelled")]
    Cancelled,

    #[error("store call timed out")]
    TimedOut,

    #[error("malformed store response: {0}")]
    Malformed(String),

    #[error("store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<VaultError> for StoreError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Malformed(msg) => Self::Malformed(msg),
            VaultError::Http(HttpClientError::Timeout) => Self::TimedOut,
            other => Self::Backend(Box::new(other)),
        }
    }
}

/// List/read access to a hierarchical key/value store.
///
/// Implementations are shared by every in-flight filesystem operation and must tolerate
/// concurrent calls. Both calls must return promptly with [`StoreError::Cancelled`] once
/// `cancel` fires.
pub trait SecretStore: Send + Sync + 'static {
    /// Immediate child names of `path`. Collections carry a trailing `/`.
    ///
    /// `Ok(None)` and `Ok(Some(vec![]))` both mean "no children".
    fn list(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<Vec<String>>, StoreError>> + Send;

    /// The secret stored at `path`, or `Ok(None)` if there is none.
    fn read(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<SecretData>, StoreError>> + Send;
}

impl<C: HttpClient> SecretStore for VaultClient<C> {
    async fn list(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<String>>, StoreError> {
        let logical = self.logical();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StoreError::Cancelled),
            listing = logical.list(path) => listing.map_err(StoreError::from),
        }
    }

    async fn read(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<SecretData>, StoreError> {
        let logical = self.logical();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StoreError::Cancelled),
            secret = logical.read(path) => secret.map_err(StoreError::from),
        }
    }
}
