#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use vault_fs::fs::{DirNode, VaultFs};
use vault_fs::store::{SecretData, SecretStore, StoreError};

/// What the fake store does with a call to a given path.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail with a backend error.
    Backend,
    /// Never answer; only cancellation ends the call.
    Hang,
}

/// Shared state backing [`FakeStore`].
#[derive(Debug, Default)]
pub struct FakeState {
    /// `path -> raw listing`. A missing path lists as `None`.
    pub listings: HashMap<String, Vec<String>>,
    /// `path -> secret payload`.
    pub secrets: HashMap<String, SecretData>,
    /// `path -> fault` applied to both list and read.
    pub faults: HashMap<String, Fault>,
    /// Every call in order, as `"list <path>"` or `"read <path>"`.
    pub calls: Mutex<Vec<String>>,
    pub list_count: AtomicUsize,
    pub read_count: AtomicUsize,
}

impl FakeState {
    pub fn add_listing(&mut self, path: &str, names: &[&str]) {
        self.listings.insert(path.to_owned(), listing(names));
    }

    pub fn add_secret(&mut self, path: &str, value: serde_json::Value) {
        self.secrets.insert(path.to_owned(), secret(value));
    }

    pub fn add_fault(&mut self, path: &str, fault: Fault) {
        self.faults.insert(path.to_owned(), fault);
    }
}

/// An in-memory [`SecretStore`] with call recording and fault injection.
#[derive(Debug, Clone, Default)]
pub struct FakeStore {
    pub state: Arc<FakeState>,
}

impl FakeStore {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn list_count(&self) -> usize {
        self.state.list_count.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.state.read_count.load(Ordering::SeqCst)
    }

    async fn fault(&self, path: &str, cancel: &CancellationToken) -> Result<(), StoreError> {
        match self.state.faults.get(path) {
            None => Ok(()),
            Some(Fault::Backend) => Err(StoreError::Backend("injected failure".into())),
            Some(Fault::Hang) => {
                cancel.cancelled().await;
                Err(StoreError::Cancelled)
            }
        }
    }
}

impl SecretStore for FakeStore {
    async fn list(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<String>>, StoreError> {
        self.state.list_count.fetch_add(1, Ordering::SeqCst);
        self.state.calls.lock().unwrap().push(format!("list {path}"));
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.fault(path, cancel).await?;
        Ok(self.state.listings.get(path).cloned())
    }

    async fn read(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<SecretData>, StoreError> {
        self.state.read_count.fetch_add(1, Ordering::SeqCst);
        self.state.calls.lock().unwrap().push(format!("read {path}"));
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.fault(path, cancel).await?;
        Ok(self.state.secrets.get(path).cloned())
    }
}

/// Build a secret payload from a JSON object literal.
pub fn secret(value: serde_json::Value) -> SecretData {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("secret payload must be an object, got {other}"),
    }
}

pub fn listing(names: &[&str]) -> Vec<String> {
    names.iter().map(|&n| n.to_owned()).collect()
}

/// The store from the walkthrough scenarios: prefix `/secret` holding `db/`, `api-key`,
/// and under `db/` the secret `password`.
pub fn sample_state() -> FakeState {
    let mut state = FakeState::default();
    state.add_listing("/secret", &["db/", "api-key"]);
    state.add_listing("/secret/db", &["password"]);
    state.add_secret("/secret/api-key", json!({ "value": "k-123" }));
    let creds = json!({ "user": "admin", "password": "hunter2" });
    state.add_secret("/secret/db/password", creds);
    state
}

/// A filesystem over `state` rooted at `/secret`, and the fake backing it.
pub fn sample_fs(state: FakeState) -> (VaultFs<FakeStore>, FakeStore) {
    let store = FakeStore::new(state);
    let fs = VaultFs::with_store(store.clone(), "/mnt/vault", "/secret");
    (fs, store)
}

pub fn sample_root() -> (DirNode<FakeStore>, FakeStore) {
    let (fs, store) = sample_fs(sample_state());
    (fs.root(), store)
}
