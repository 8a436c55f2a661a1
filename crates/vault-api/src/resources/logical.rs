//! Logical (path based) resource.

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::VaultClient;
use crate::error::VaultError;
use crate::http_client::HttpClient;
use crate::models::SecretData;

/// Read and list operations on Vault's logical API.
pub struct LogicalResource<'c, C: HttpClient> {
    client: &'c VaultClient<C>,
}

impl<'c, C: HttpClient> LogicalResource<'c, C> {
    pub(crate) fn new(client: &'c VaultClient<C>) -> Self {
        Self { client }
    }

    /// Read the secret stored at `path`.
    ///
    /// `Ok(None)` means nothing exists at `path`. A secret with no data yields an empty map.
    pub async fn read(&self, path: &str) -> Result<Option<SecretData>, VaultError> {
        let Some(secret) = self.client.get(path, false).await? else {
            return Ok(None);
        };

        debug!(
            path,
            request_id = %secret.request_id,
            lease_id = %secret.lease_id,
            lease_duration = secret.lease_duration,
            renewable = secret.renewable,
            "read secret"
        );
        for warning in secret.warnings.iter().flatten() {
            warn!(path, %warning, "vault returned a warning");
        }
        Ok(Some(secret.data.unwrap_or_default()))
    }

    /// List the immediate children of `path`.
    ///
    /// Collection keys keep Vault's trailing `/`. `Ok(None)` means the path has no children.
    pub async fn list(&self, path: &str) -> Result<Option<Vec<String>>, VaultError> {
        let Some(secret) = self.client.get(path, true).await? else {
            return Ok(None);
        };
        let Some(mut data) = secret.data else {
            return Ok(None);
        };

        match data.remove("keys") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(keys)) => keys
                .into_iter()
                .enumerate()
                .map(|(i, key)| match key {
                    Value::String(key) => Ok(key),
                    other => Err(VaultError::Malformed(format!(
                        "listing entry {i} is not a string: {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(VaultError::Malformed(format!(
                "`keys` is not an array: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use http::StatusCode;
    use secrecy::SecretString;

    use super::*;
    use crate::client::{ClientBuilder, ClientConfig};
    use crate::error::HttpClientError;
    use crate::http_client::{HttpRequest, HttpResponse};

    /// Replies with a canned response and records every request.
    struct CannedHttp {
        status: StatusCode,
        body: &'static str,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl HttpClient for Arc<CannedHttp> {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
            self.requests.lock().unwrap().push(request);
            Ok(HttpResponse {
                status: self.status,
                body: Bytes::from_static(self.body.as_bytes()),
            })
        }
    }

    fn canned(status: StatusCode, body: &'static str) -> Arc<CannedHttp> {
        Arc::new(CannedHttp {
            status,
            body,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn client(http: &Arc<CannedHttp>) -> VaultClient<Arc<CannedHttp>> {
        let config = ClientConfig {
            address: "https://vault.test:8200/".to_owned(),
            namespace: Some("team-a".to_owned()),
            ..ClientConfig::default()
        };
        ClientBuilder::new(config)
            .token(SecretString::from("s.token"))
            .build_with(Arc::clone(http))
            .unwrap()
    }

    fn urls(http: &CannedHttp) -> Vec<String> {
        let requests = http.requests.lock().unwrap();
        requests.iter().map(|r| r.url.clone()).collect()
    }

    #[tokio::test]
    async fn list_sends_authenticated_list_request() {
        let http = canned(StatusCode::OK, r#"{"data":{"keys":["a/","b"]}}"#);
        let keys = client(&http).logical().list("/secret").await.unwrap();
        assert_eq!(keys, Some(vec!["a/".to_owned(), "b".to_owned()]));

        let requests = http.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://vault.test:8200/v1/secret/?list=true");
        assert_eq!(requests[0].headers["x-vault-token"], "s.token");
        assert_eq!(requests[0].headers["x-vault-namespace"], "team-a");
    }

    #[tokio::test]
    async fn listing_the_store_root_has_no_empty_segment() {
        let http = canned(StatusCode::OK, r#"{"data":{"keys":["secret/"]}}"#);
        let client = client(&http);
        client.logical().list("/").await.unwrap();
        client.logical().list("").await.unwrap();
        assert_eq!(
            urls(&http),
            [
                "https://vault.test:8200/v1/?list=true",
                "https://vault.test:8200/v1/?list=true",
            ]
        );
    }

    #[tokio::test]
    async fn read_escapes_path_segments() {
        let http = canned(StatusCode::OK, r#"{"data":{"user":"admin"}}"#);
        let data = client(&http)
            .logical()
            .read("/secret/db creds?")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data["user"], "admin");
        assert_eq!(urls(&http), ["https://vault.test:8200/v1/secret/db%20creds%3F"]);
    }

    #[tokio::test]
    async fn not_found_is_none_for_read_and_list() {
        let http = canned(StatusCode::NOT_FOUND, r#"{"errors":[]}"#);
        let client = client(&http);
        assert!(client.logical().read("/secret/nope").await.unwrap().is_none());
        assert!(client.logical().list("/secret/nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_without_data_is_an_empty_secret() {
        let http = canned(StatusCode::OK, r#"{"request_id":"r","lease_duration":0}"#);
        let data = client(&http).logical().read("/secret/x").await.unwrap();
        assert_eq!(data, Some(SecretData::new()));
    }

    #[tokio::test]
    async fn non_string_key_is_malformed() {
        let http = canned(StatusCode::OK, r#"{"data":{"keys":["a",7]}}"#);
        let err = client(&http).logical().list("/secret").await.unwrap_err();
        assert!(matches!(err, VaultError::Malformed(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn keys_of_wrong_type_is_malformed() {
        let http = canned(StatusCode::OK, r#"{"data":{"keys":"a"}}"#);
        let err = client(&http).logical().list("/secret").await.unwrap_err();
        assert!(matches!(err, VaultError::Malformed(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn error_status_carries_vault_messages() {
        let http = canned(StatusCode::FORBIDDEN, r#"{"errors":["permission denied"]}"#);
        let err = client(&http).logical().read("/secret/x").await.unwrap_err();
        match err {
            VaultError::Api { status, errors } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(errors, vec!["permission denied".to_owned()]);
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
