#![allow(clippy::unwrap_used, missing_docs)]

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use vault_api::{
    ClientBuilder, ClientConfig, HttpClient, HttpClientError, HttpRequest, HttpResponse,
    VaultClient,
};

use vault_fs::fs::{FsError, Node, NodeKind, VaultFs};
use vault_fs::store::{SecretStore, StoreError};

const BASE: &str = "https://vault.test:8200";

/// How the fake HTTP backend answers.
enum Backend {
    /// Fixed `(status, body)` per URL; anything else is a 404.
    Routes(HashMap<String, (StatusCode, &'static str)>),
    /// Never answers.
    Hang,
    /// Fails every request with a client-side timeout.
    TimingOut,
}

impl HttpClient for Backend {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        match self {
            Self::Routes(routes) => {
                let (status, body) = routes
                    .get(&request.url)
                    .copied()
                    .unwrap_or((StatusCode::NOT_FOUND, r#"{"errors":[]}"#));
                Ok(HttpResponse {
                    status,
                    body: Bytes::from_static(body.as_bytes()),
                })
            }
            Self::Hang => std::future::pending().await,
            Self::TimingOut => Err(HttpClientError::Timeout),
        }
    }
}

fn client(backend: Backend) -> VaultClient<Backend> {
    let config = ClientConfig {
        address: BASE.to_owned(),
        ..ClientConfig::default()
    };
    ClientBuilder::new(config)
        .token(SecretString::from("s.token"))
        .build_with(backend)
        .unwrap()
}

fn sample_routes() -> Backend {
    let routes = [
        ("/v1/secret/?list=true", r#"{"data":{"keys":["db/","api-key"]}}"#),
        ("/v1/secret/db/?list=true", r#"{"data":{"keys":["password"]}}"#),
        ("/v1/secret/api-key", r#"{"data":{"value":"k-123"}}"#),
    ];
    Backend::Routes(
        routes
            .into_iter()
            .map(|(path, body)| (format!("{BASE}{path}"), (StatusCode::OK, body)))
            .collect(),
    )
}

#[tokio::test]
async fn vault_client_lists_and_reads() {
    let store = client(sample_routes());
    let cancel = CancellationToken::new();

    let keys = store.list("/secret", &cancel).await.unwrap();
    assert_eq!(keys, Some(vec!["db/".to_owned(), "api-key".to_owned()]));

    let secret = store.read("/secret/api-key", &cancel).await.unwrap();
    assert_eq!(secret.unwrap()["value"], "k-123");

    assert!(store.read("/secret/nope", &cancel).await.unwrap().is_none());
}

#[tokio::test]
async fn vault_backed_tree_resolves_files_and_collections() {
    let fs = VaultFs::with_store(client(sample_routes()), "/mnt/vault", "/secret");
    let root = fs.root();
    let cancel = CancellationToken::new();

    let kinds: Vec<_> = root
        .read_dir_all(&cancel)
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.name, e.kind))
        .collect();
    assert_eq!(
        kinds,
        [
            ("db".to_owned(), NodeKind::Directory),
            ("api-key".to_owned(), NodeKind::File),
        ]
    );

    let Node::File(file) = root.lookup("api-key", &cancel).await.unwrap() else {
        panic!("expected a file node");
    };
    assert_eq!(file.read().unwrap(), b"{\n  \"value\": \"k-123\"\n}\n");
    let db = root.lookup("db", &cancel).await.unwrap();
    assert_eq!(db.kind(), NodeKind::Directory);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_aborts_a_hanging_request() {
    let store = client(Backend::Hang);
    let cancel = CancellationToken::new();

    let read = tokio::spawn({
        let cancel = cancel.clone();
        async move { store.read("/secret/db", &cancel).await.map(|_| ()) }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), read).await;
    let result = result.unwrap().unwrap();
    assert!(matches!(result, Err(StoreError::Cancelled)), "got {result:?}");
}

#[tokio::test]
async fn client_timeout_is_a_timeout() {
    let store = client(Backend::TimingOut);
    let cancel = CancellationToken::new();

    let result = store.list("/secret", &cancel).await;
    assert!(matches!(result, Err(StoreError::TimedOut)), "got {result:?}");
}

#[tokio::test]
async fn client_timeout_surfaces_as_etimedout() {
    let fs = VaultFs::with_store(client(Backend::TimingOut), "/mnt/vault", "/secret");
    let cancel = CancellationToken::new();

    let err = fs.root().lookup("db", &cancel).await.unwrap_err();
    assert!(matches!(err, FsError::TimedOut), "got {err:?}");
    assert_eq!(err.errno(), libc::ETIMEDOUT);

    let result = fs.root().read_dir_all(&cancel).await;
    assert!(matches!(result, Err(FsError::TimedOut)), "got {result:?}");
}
