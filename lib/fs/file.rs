//! File nodes.

use std::sync::Arc;

use tracing::error;

use super::node::{NodeIdentity, NodePath};
use super::{FsError, InodePerms, NodeAttr, NodeKind};
use crate::store::SecretData;

/// A leaf secret, holding the payload its parent fetched during lookup.
///
/// Attributes and content are derived from that payload alone; a file never goes back to
/// the store. A fresh lookup produces a fresh node.
#[derive(Debug, Clone)]
pub struct FileNode {
    id: NodeIdentity,
    secret: Arc<SecretData>,
}

impl FileNode {
    pub(crate) fn new(path: NodePath, secret: SecretData) -> Self {
        Self {
            id: NodeIdentity::new(path, NodeKind::File),
            secret: Arc::new(secret),
        }
    }

    #[must_use]
    pub fn identity(&self) -> &NodeIdentity {
        &self.id
    }

    /// The full rendered content: the secret as indented JSON plus a trailing newline.
    pub fn read(&self) -> Result<Vec<u8>, FsError> {
        let mut content = serde_json::to_vec_pretty(self.secret.as_ref()).map_err(|err| {
            error!(path = %self.id, error = %err, "failed to render secret");
            FsError::Io
        })?;
        content.push(b'\n');
        Ok(content)
    }

    /// File attributes; the size is the length of the rendered content.
    pub fn attr(&self) -> Result<NodeAttr, FsError> {
        let size = self.read()?.len() as u64;
        Ok(NodeAttr {
            ino: self.id.inode(),
            kind: NodeKind::File,
            perm: InodePerms::READ_ONLY,
            size,
            nlink: 1,
        })
    }
}
