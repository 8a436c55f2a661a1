//! vault-fs shared library.
//!
//! Maps a hierarchical secret store onto a read-only filesystem tree.

/// Filesystem nodes, inode identity and the FUSE bridge.
pub mod fs;
/// The remote secret store capability.
pub mod store;
