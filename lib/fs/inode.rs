//! Inode numbers derived from node identity.
//!
//! An inode is the CRC-64/ISO checksum of `"<d_type>:<absolute path>"`. The same
//! `(path, kind)` pair always yields the same number, so identities survive across lookups
//! without any bookkeeping. Distinct pairs may collide; collisions are neither detected nor
//! resolved. For a read-only tree without hard links a collision can only confuse the
//! kernel's attribute cache, never the content served.

use crc::{CRC_64_GO_ISO, Crc};

use super::{InodeAddr, NodeKind};

const CRC64_ISO: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Derive the inode for the node at `path` of the given `kind`.
#[must_use]
pub fn inode(path: &str, kind: NodeKind) -> InodeAddr {
    let mut digest = CRC64_ISO.digest();
    digest.update(kind.dirent_type().to_string().as_bytes());
    digest.update(b":");
    digest.update(path.as_bytes());
    digest.finalize()
}
