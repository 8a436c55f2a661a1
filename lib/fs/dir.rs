//! Directory nodes.
//!
//! A directory is a path prefix in the store. It caches nothing: every lookup and every
//! listing goes back to the store, so the tree always reflects the store's current state.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use super::classify::classify;
use super::inode::inode;
use super::node::{Node, NodeIdentity, NodePath};
use super::{DirEntry, FileNode, FsError, InodePerms, NodeAttr, NodeKind};
use crate::store::{SecretStore, StoreError};

/// A directory backed by a prefix query against the store.
pub struct DirNode<S> {
    id: NodeIdentity,
    store: Arc<S>,
}

impl<S> Clone for DirNode<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> DirNode<S> {
    pub(crate) fn new(path: NodePath, store: Arc<S>) -> Self {
        Self {
            id: NodeIdentity::new(path, NodeKind::Directory),
            store,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &NodeIdentity {
        &self.id
    }

    /// Directory attributes. Never touches the store.
    #[must_use]
    pub fn attr(&self) -> NodeAttr {
        NodeAttr {
            ino: self.id.inode(),
            kind: NodeKind::Directory,
            perm: InodePerms::READ_EXECUTE,
            size: 0,
            nlink: 2,
        }
    }
}

impl<S: SecretStore> DirNode<S> {
    /// Resolve the child `name`.
    ///
    /// A point read that returns a secret yields a file carrying that secret. When the read
    /// finds nothing, the same path is listed: children mean the name is a sub-collection,
    /// no children mean it does not exist. A name that is both a secret and a collection in
    /// the store resolves to the secret.
    #[instrument(name = "DirNode::lookup", skip(self, cancel), fields(dir = %self.id))]
    pub async fn lookup(&self, name: &str, cancel: &CancellationToken) -> Result<Node<S>, FsError> {
        let Some(path) = self.id.path().join(name) else {
            debug!(name, "rejecting name that is not a single path segment");
            return Err(FsError::NotFound);
        };

        match self.store.read(path.as_str(), cancel).await {
            Ok(Some(secret)) => return Ok(Node::File(FileNode::new(path, secret))),
            Ok(None) => {}
            Err(err) => return Err(store_failure(&path, "read", err)),
        }

        match self.store.list(path.as_str(), cancel).await {
            Ok(Some(children)) if !children.is_empty() => {
                debug!(%path, "resolved sub-collection");
                Ok(Node::Dir(Self::new(path, Arc::clone(&self.store))))
            }
            Ok(_) => Err(FsError::NotFound),
            Err(err) => Err(store_failure(&path, "list", err)),
        }
    }

    /// List every child of this directory, in the order the store returned them.
    ///
    /// A listing with no result is an empty directory. Any failure discards the whole
    /// listing.
    #[instrument(name = "DirNode::read_dir_all", skip(self, cancel), fields(dir = %self.id))]
    pub async fn read_dir_all(&self, cancel: &CancellationToken) -> Result<Vec<DirEntry>, FsError> {
        let path = self.id.path();
        let raw = match self.store.list(path.as_str(), cancel).await {
            Ok(raw) => raw.unwrap_or_default(),
            Err(err) => return Err(store_failure(path, "list", err)),
        };

        let entries = raw
            .iter()
            .map(|raw| {
                let (name, kind) = classify(raw);
                let Some(child) = path.join(name) else {
                    error!(
                        %path,
                        entry = %raw,
                        "store listed an entry that is not a path segment"
                    );
                    return Err(FsError::Io);
                };
                Ok(DirEntry {
                    name: name.to_owned(),
                    ino: inode(child.as_str(), kind),
                    kind,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(shadow_collections(entries))
    }
}

/// Drop collections that share their name with a secret in the same listing.
///
/// Lookup resolves such a name to the secret, so the listing must not show it twice.
fn shadow_collections(entries: Vec<DirEntry>) -> Vec<DirEntry> {
    let secrets: HashSet<String> = entries
        .iter()
        .filter(|e| e.kind == NodeKind::File)
        .map(|e| e.name.clone())
        .collect();

    entries
        .into_iter()
        .filter(|e| {
            let shadowed = e.kind == NodeKind::Directory && secrets.contains(&e.name);
            if shadowed {
                debug!(name = %e.name, "collection shadowed by secret of the same name");
            }
            !shadowed
        })
        .collect()
}

/// Log a failed store call and translate it for the kernel.
fn store_failure(path: &NodePath, op: &'static str, err: StoreError) -> FsError {
    match err {
        StoreError::Cancelled => {
            debug!(%path, op, "store call cancelled");
            FsError::Cancelled
        }
        StoreError::TimedOut => {
            warn!(%path, op, "store call timed out");
            FsError::TimedOut
        }
        err => {
            error!(%path, op, error = %err, "store call failed");
            FsError::Io
        }
    }
}
