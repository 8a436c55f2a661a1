//! Node identity and path composition.
//!
//! Every node, directory or file, is identified by its absolute store path, which is always
//! the configured prefix followed by zero or more validated segments.

use std::fmt;
use std::sync::Arc;

use super::classify::{SEPARATOR, is_valid_segment};
use super::inode::inode;
use super::{DirNode, FileNode, FsError, InodeAddr, NodeAttr, NodeKind};
use crate::store::SecretStore;

/// An absolute store path rooted under the mount prefix.
///
/// Never carries a trailing separator; the store client adds one when it issues a listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePath {
    prefix: Arc<str>,
    segments: Vec<String>,
    abs: String,
}

impl NodePath {
    /// The path of the mount root for `prefix`.
    ///
    /// Redundant separators are collapsed, so `secret/`, `/secret` and `//secret//` all
    /// denote `/secret`. An empty prefix mounts the whole store at `/`.
    #[must_use]
    pub fn root(prefix: &str) -> Self {
        let parts: Vec<&str> = prefix.split(SEPARATOR).filter(|s| !s.is_empty()).collect();
        let prefix = if parts.is_empty() {
            String::new()
        } else {
            format!("/{}", parts.join("/"))
        };
        let abs = if prefix.is_empty() {
            SEPARATOR.to_string()
        } else {
            prefix.clone()
        };

        Self {
            prefix: Arc::from(prefix),
            segments: Vec::new(),
            abs,
        }
    }

    /// The path of the child `name`, or `None` if `name` would leave this directory.
    #[must_use]
    pub fn join(&self, name: &str) -> Option<Self> {
        if !is_valid_segment(name) {
            return None;
        }

        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        let abs = format!("{}/{}", self.prefix, segments.join("/"));
        Some(Self {
            prefix: Arc::clone(&self.prefix),
            segments,
            abs,
        })
    }

    /// The enclosing directory. The root is its own parent.
    #[must_use]
    pub fn parent(&self) -> Self {
        let mut parent = Self {
            prefix: Arc::clone(&self.prefix),
            segments: self.segments.clone(),
            abs: String::new(),
        };
        parent.segments.pop();
        parent.abs = if parent.segments.is_empty() {
            Self::root(&self.prefix).abs
        } else {
            format!("{}/{}", parent.prefix, parent.segments.join("/"))
        };
        parent
    }

    /// The absolute path as sent to the store.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.abs
    }

    /// The final segment; empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// The normalized mount prefix this path lives under.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.abs)
    }
}

/// Identity shared by every node: inode, name and absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    inode: InodeAddr,
    path: NodePath,
}

impl NodeIdentity {
    pub(crate) fn new(path: NodePath, kind: NodeKind) -> Self {
        Self {
            inode: inode(path.as_str(), kind),
            path,
        }
    }

    #[must_use]
    pub fn inode(&self) -> InodeAddr {
        self.inode
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.path.name()
    }

    #[must_use]
    pub fn path(&self) -> &NodePath {
        &self.path
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.fmt(f)
    }
}

/// A resolved node of either kind.
pub enum Node<S> {
    Dir(DirNode<S>),
    File(FileNode),
}

impl<S> Clone for Node<S> {
    fn clone(&self) -> Self {
        match self {
            Self::Dir(dir) => Self::Dir(dir.clone()),
            Self::File(file) => Self::File(file.clone()),
        }
    }
}

impl<S> fmt::Debug for Node<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dir(dir) => f.debug_tuple("Dir").field(dir.identity()).finish(),
            Self::File(file) => f.debug_tuple("File").field(file.identity()).finish(),
        }
    }
}

impl<S: SecretStore> Node<S> {
    #[must_use]
    pub fn identity(&self) -> &NodeIdentity {
        match self {
            Self::Dir(dir) => dir.identity(),
            Self::File(file) => file.identity(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Dir(_) => NodeKind::Directory,
            Self::File(_) => NodeKind::File,
        }
    }

    /// Attributes of this node. Only files can fail, when their content cannot be rendered.
    pub fn attr(&self) -> Result<NodeAttr, FsError> {
        match self {
            Self::Dir(dir) => Ok(dir.attr()),
            Self::File(file) => file.attr(),
        }
    }
}
