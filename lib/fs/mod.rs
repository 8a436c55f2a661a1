//! Filesystem view over a secret store.
/// Raw listing entry classification.
pub mod classify;
/// Directory nodes: lookup and listing.
pub mod dir;
/// File nodes: attributes and content.
pub mod file;
/// FUSE adapter: maps [`fuser::Filesystem`] callbacks onto the node tree.
pub mod fuser;
/// Deterministic inode identity.
pub mod inode;
/// Node identity and path composition.
pub mod node;
/// The mountable filesystem root.
pub mod root;
/// Kernel inode number to node mapping.
pub mod table;

pub use dir::DirNode;
pub use file::FileNode;
pub use fuser::{FuserAdapter, MountSettings};
pub use node::{Node, NodeIdentity, NodePath};
pub use root::VaultFs;

use bitflags::bitflags;
use thiserror::Error;

/// Type representing an inode identifier.
pub type InodeAddr = u64;

bitflags! {
    /// Permission bits for an inode, similar to Unix file permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InodePerms: u16 {
        /// Other: execute permission.
        const OTHER_EXECUTE = 1 << 0;
        /// Other: read permission.
        const OTHER_READ    = 1 << 2;
        /// Group: execute permission.
        const GROUP_EXECUTE = 1 << 3;
        /// Group: read permission.
        const GROUP_READ    = 1 << 5;
        /// Owner: execute permission.
        const OWNER_EXECUTE = 1 << 6;
        /// Owner: read permission.
        const OWNER_READ    = 1 << 8;

        /// `0o444`: readable by everyone.
        const READ_ONLY = Self::OWNER_READ.bits()
            | Self::GROUP_READ.bits()
            | Self::OTHER_READ.bits();
        /// `0o555`: readable and traversable by everyone.
        const READ_EXECUTE = Self::READ_ONLY.bits()
            | Self::OWNER_EXECUTE.bits()
            | Self::GROUP_EXECUTE.bits()
            | Self::OTHER_EXECUTE.bits();
    }
}

/// Whether a node is a collection or a leaf secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A leaf secret.
    File,
    /// A path prefix with children.
    Directory,
}

impl NodeKind {
    /// The `d_type` value for this kind (`DT_REG` or `DT_DIR`).
    #[must_use]
    pub const fn dirent_type(self) -> u8 {
        match self {
            Self::File => libc::DT_REG,
            Self::Directory => libc::DT_DIR,
        }
    }
}

/// Attributes reported for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    /// Inode identity.
    pub ino: InodeAddr,
    /// File or directory.
    pub kind: NodeKind,
    /// Permission bits.
    pub perm: InodePerms,
    /// Content length in bytes; zero for directories.
    pub size: u64,
    /// Link count.
    pub nlink: u32,
}

/// A single entry produced by [`DirNode::read_dir_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name within the parent directory, separator stripped.
    pub name: String,
    /// Inode of the child.
    pub ino: InodeAddr,
    /// Child kind.
    pub kind: NodeKind,
}

/// Errors returned by node operations and the mount lifecycle.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such entry")]
    NotFound,

    #[error("input/output error")]
    Io,

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out")]
    TimedOut,

    #[error("filesystem is not mounted")]
    NotMounted,

    #[error("mount failure: {0}")]
    Mount(#[source] std::io::Error),
}

impl FsError {
    /// The errno reported to the kernel for this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::Cancelled => libc::EINTR,
            Self::TimedOut => libc::ETIMEDOUT,
            Self::Io | Self::NotMounted | Self::Mount(_) => libc::EIO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perms_match_octal_modes() {
        assert_eq!(InodePerms::READ_ONLY.bits(), 0o444);
        assert_eq!(InodePerms::READ_EXECUTE.bits(), 0o555);
    }

    #[test]
    fn errors_map_to_distinct_errnos() {
        assert_eq!(FsError::NotFound.errno(), libc::ENOENT);
        assert_eq!(FsError::Io.errno(), libc::EIO);
        assert_eq!(FsError::Cancelled.errno(), libc::EINTR);
        assert_eq!(FsError::TimedOut.errno(), libc::ETIMEDOUT);
    }
}
