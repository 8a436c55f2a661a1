//! Vault client and its builder.

use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use secrecy::{ExposeSecret as _, SecretString};
use tracing::{debug, trace};

use crate::error::VaultError;
use crate::http_client::{HttpClient, HttpRequest};
use crate::models::{ErrorResponse, SecretResponse};
use crate::resources::LogicalResource;

const TOKEN_HEADER: HeaderName = HeaderName::from_static("x-vault-token");
const NAMESPACE_HEADER: HeaderName = HeaderName::from_static("x-vault-namespace");
const REQUEST_HEADER: HeaderName = HeaderName::from_static("x-vault-request");

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Connection settings for a [`VaultClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base address of the Vault server, e.g. `https://vault.example.com:8200`.
    pub address: String,
    /// Enterprise namespace sent with every request.
    pub namespace: Option<String>,
    /// Per-request timeout enforced by the HTTP backend.
    pub timeout: Duration,
    /// Disable TLS certificate verification.
    pub skip_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_owned(),
            namespace: None,
            timeout: Duration::from_secs(60),
            skip_verify: false,
        }
    }
}

pub(crate) struct ClientInner<C: HttpClient> {
    http: C,
    base_url: String,
    headers: HeaderMap,
}

/// A Vault API client, generic over its HTTP backend.
///
/// Cloning is cheap; clones share the backend and credentials.
pub struct VaultClient<C: HttpClient> {
    inner: Arc<ClientInner<C>>,
}

impl<C: HttpClient> Clone for VaultClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// A [`VaultClient`] using the default reqwest backend.
#[cfg(feature = "reqwest-client")]
pub type Vault = VaultClient<crate::backends::ReqwestClient>;

/// Builds a [`VaultClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    token: Option<SecretString>,
}

impl ClientBuilder {
    /// Start building a client for the given configuration.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            token: None,
        }
    }

    /// Authenticate every request with `token`.
    #[must_use]
    pub fn token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    /// Build a client backed by reqwest.
    #[cfg(feature = "reqwest-client")]
    pub fn build(self) -> Result<Vault, VaultError> {
        let http =
            crate::backends::ReqwestClient::new(self.config.timeout, self.config.skip_verify)?;
        self.build_with(http)
    }

    /// Build a client using a caller-supplied HTTP backend.
    pub fn build_with<C: HttpClient>(self, http: C) -> Result<VaultClient<C>, VaultError> {
        let base_url = validate_address(&self.config.address)?;

        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_HEADER, HeaderValue::from_static("true"));
        if let Some(token) = &self.token {
            let mut value = HeaderValue::from_str(token.expose_secret())?;
            value.set_sensitive(true);
            headers.insert(TOKEN_HEADER, value);
        }
        if let Some(namespace) = &self.config.namespace {
            headers.insert(NAMESPACE_HEADER, HeaderValue::from_str(namespace)?);
        }

        debug!(address = %base_url, namespace = ?self.config.namespace, "built vault client");
        Ok(VaultClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                headers,
            }),
        })
    }
}

/// Checks that `address` is an absolute http(s) URL and strips any trailing slash.
fn validate_address(address: &str) -> Result<String, VaultError> {
    let invalid = |reason: &str| VaultError::InvalidAddress {
        address: address.to_owned(),
        reason: reason.to_owned(),
    };

    let uri: Uri = address.parse().map_err(|_| invalid("not a valid URI"))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(_) => return Err(invalid("scheme must be http or https")),
        None => return Err(invalid("missing scheme")),
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host"));
    }

    Ok(address.trim_end_matches('/').to_owned())
}

impl<C: HttpClient> VaultClient<C> {
    /// Operations on the logical (path based) API.
    #[must_use]
    pub fn logical(&self) -> LogicalResource<'_, C> {
        LogicalResource::new(self)
    }

    /// Build the request URL for a logical path.
    ///
    /// Listings get a trailing separator, the form Vault documents for `LIST`.
    fn url_for(&self, path: &str, list: bool) -> String {
        let encoded = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");

        if list && encoded.is_empty() {
            format!("{}/v1/?list=true", self.inner.base_url)
        } else if list {
            format!("{}/v1/{encoded}/?list=true", self.inner.base_url)
        } else {
            format!("{}/v1/{encoded}", self.inner.base_url)
        }
    }

    /// Issue a logical `GET` (or `LIST` when `list` is set).
    ///
    /// Returns `Ok(None)` when Vault reports nothing at the path, which it signals with a 404
    /// for both missing secrets and empty listings.
    pub(crate) async fn get(
        &self,
        path: &str,
        list: bool,
    ) -> Result<Option<SecretResponse>, VaultError> {
        let request = HttpRequest {
            method: Method::GET,
            url: self.url_for(path, list),
            headers: self.inner.headers.clone(),
        };
        trace!(url = %request.url, list, "sending vault request");

        let response = self.inner.http.send(request).await?;
        match response.status {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                if response.body.is_empty() {
                    return Ok(None);
                }
                Ok(Some(serde_json::from_slice(&response.body)?))
            }
            status => {
                let errors = serde_json::from_slice::<ErrorResponse>(&response.body)
                    .map(|body| body.errors)
                    .unwrap_or_default();
                Err(VaultError::Api { status, errors })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_without_scheme_is_rejected() {
        let err = validate_address("vault.local:8200").unwrap_err();
        assert!(matches!(err, VaultError::InvalidAddress { .. }));
    }

    #[test]
    fn address_with_unsupported_scheme_is_rejected() {
        let err = validate_address("ftp://vault.local").unwrap_err();
        assert!(matches!(err, VaultError::InvalidAddress { .. }));
    }

    #[test]
    fn trailing_slash_is_stripped() {
        assert_eq!(
            validate_address("https://vault.local:8200/").unwrap(),
            "https://vault.local:8200"
        );
    }
}
