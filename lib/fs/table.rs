//! Kernel inode number to node mapping.
//!
//! Inode numbers are content-derived (see [`inode`](super::inode)), but the kernel only ever
//! hands back a number. [`NodeTable`] remembers which node each number stands for, for as
//! long as the kernel holds a lookup reference to it.
//!
//! The root is special: the kernel addresses it as [`fuser::FUSE_ROOT_ID`] regardless of its
//! derived inode, and it is never forgotten.

use tracing::{debug, warn};

use super::{DirNode, InodeAddr, Node};
use crate::store::SecretStore;

struct Slot<S> {
    node: Node<S>,
    /// Outstanding kernel lookups.
    lookups: u64,
}

/// Concurrent map from kernel inode numbers to live nodes.
pub struct NodeTable<S> {
    root: DirNode<S>,
    nodes: scc::HashMap<InodeAddr, Slot<S>>,
}

impl<S: SecretStore> NodeTable<S> {
    /// The inode number the kernel uses for the mount root.
    pub const ROOT_INO: InodeAddr = fuser::FUSE_ROOT_ID;

    #[must_use]
    pub fn new(root: DirNode<S>) -> Self {
        Self {
            root,
            nodes: scc::HashMap::new(),
        }
    }

    /// Translate a derived inode into the number reported to the kernel.
    #[must_use]
    pub fn kernel_ino(&self, ino: InodeAddr) -> InodeAddr {
        if ino == self.root.identity().inode() {
            Self::ROOT_INO
        } else {
            ino
        }
    }

    /// The node the kernel knows as `ino`.
    #[must_use]
    pub fn get(&self, ino: InodeAddr) -> Option<Node<S>> {
        if ino == Self::ROOT_INO {
            return Some(Node::Dir(self.root.clone()));
        }
        self.nodes.read_sync(&ino, |_, slot| slot.node.clone())
    }

    /// Record a node handed to the kernel by a successful lookup and return its kernel inode.
    ///
    /// A repeated lookup replaces the stored node, so the freshest payload wins.
    pub fn remember(&self, node: Node<S>) -> InodeAddr {
        let ino = self.kernel_ino(node.identity().inode());
        if ino == Self::ROOT_INO {
            return ino;
        }

        match self.nodes.entry_sync(ino) {
            scc::hash_map::Entry::Occupied(mut occ) => {
                let slot = occ.get_mut();
                if slot.node.identity().path() != node.identity().path() {
                    warn!(
                        ino,
                        existing = %slot.node.identity(),
                        replacement = %node.identity(),
                        "inode collision, replacing node"
                    );
                }
                slot.node = node;
                slot.lookups += 1;
            }
            scc::hash_map::Entry::Vacant(vac) => {
                vac.insert_entry(Slot { node, lookups: 1 });
            }
        }
        ino
    }

    /// Drop `nlookup` kernel references to `ino`, releasing the node when none remain.
    pub fn forget(&self, ino: InodeAddr, nlookup: u64) {
        if ino == Self::ROOT_INO {
            return;
        }
        let removed = self.nodes.remove_if_sync(&ino, |slot| {
            slot.lookups = slot.lookups.saturating_sub(nlookup);
            slot.lookups == 0
        });
        if removed.is_some() {
            debug!(ino, "released node");
        }
    }

    /// Number of remembered nodes, the root excluded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
