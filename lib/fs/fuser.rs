//! FUSE adapter: maps [`fuser::Filesystem`] callbacks onto the node tree.
//!
//! Each callback resolves the target node from the [`NodeTable`], runs exactly one node
//! operation on the tokio runtime and replies. Directory listings and file contents are
//! snapshotted when the handle is opened, so paging through a listing or reading a file in
//! chunks sees one consistent view.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::table::NodeTable;
use super::{DirEntry, DirNode, FsError, InodeAddr, Node, NodeAttr, NodeKind};
use crate::store::SecretStore;

/// Type representing a file handle.
pub type FileHandle = u64;

/// Trait abstracting the `.error(errno)` method common to all fuser reply types.
trait FuseReply {
    fn error(self, errno: i32);
}

macro_rules! impl_fuse_reply {
    ($($ty:ty),* $(,)?) => {
        $(impl FuseReply for $ty {
            fn error(self, errno: i32) {
                // Calls the inherent fuser method (not this trait method).
                self.error(errno);
            }
        })*
    };
}

impl_fuse_reply!(
    fuser::ReplyEntry,
    fuser::ReplyAttr,
    fuser::ReplyOpen,
    fuser::ReplyData,
    fuser::ReplyDirectory,
);

/// Extension trait on `Result<T, FsError>` for FUSE reply handling.
///
/// Centralizes the error-logging + errno-reply path so each FUSE callback
/// only has to express its success path.
trait FuseResultExt<T> {
    fn fuse_reply<R: FuseReply>(self, reply: R, on_ok: impl FnOnce(T, R));
}

impl<T> FuseResultExt<T> for Result<T, FsError> {
    fn fuse_reply<R: FuseReply>(self, reply: R, on_ok: impl FnOnce(T, R)) {
        match self {
            Ok(val) => on_ok(val, reply),
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.errno());
            }
        }
    }
}

/// Ownership, timing and cache settings applied to every mounted node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSettings {
    /// Owner reported for every node.
    pub uid: u32,
    /// Group reported for every node.
    pub gid: u32,
    /// How long the kernel may cache attributes and entries.
    pub attr_ttl: Duration,
    /// Upper bound on a single store-backed operation.
    pub request_timeout: Duration,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            attr_ttl: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

const BLOCK_SIZE: u32 = 4096;
const MAX_NAME_LENGTH: u32 = 255;

fn kind_to_fuser(kind: NodeKind) -> fuser::FileType {
    match kind {
        NodeKind::Directory => fuser::FileType::Directory,
        NodeKind::File => fuser::FileType::RegularFile,
    }
}

/// Convert node attributes to the fuser-specific `FileAttr`, reported under `ino`.
fn attr_to_fuser(
    attr: &NodeAttr,
    ino: InodeAddr,
    settings: &MountSettings,
    time: SystemTime,
) -> fuser::FileAttr {
    fuser::FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: time,
        mtime: time,
        ctime: time,
        crtime: time,
        kind: kind_to_fuser(attr.kind),
        perm: attr.perm.bits(),
        nlink: attr.nlink,
        uid: settings.uid,
        gid: settings.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// The window of `content` a read at `offset` of `size` bytes returns.
fn read_window(content: &[u8], offset: u64, size: u32) -> &[u8] {
    let start = usize::try_from(offset).map_or(content.len(), |o| o.min(content.len()));
    let end = start.saturating_add(size as usize).min(content.len());
    &content[start..end]
}

/// A directory snapshot taken at `opendir`, with the `.` and `..` entries in front.
fn listing_with_dots(own: InodeAddr, parent: InodeAddr, children: Vec<DirEntry>) -> Vec<DirEntry> {
    let mut entries = Vec::with_capacity(children.len() + 2);
    entries.push(DirEntry {
        name: ".".to_owned(),
        ino: own,
        kind: NodeKind::Directory,
    });
    entries.push(DirEntry {
        name: "..".to_owned(),
        ino: parent,
        kind: NodeKind::Directory,
    });
    entries.extend(children);
    entries
}

/// Block on `op`, handing it a child of `shutdown` and giving up after `timeout`.
fn run_bounded<T, F>(
    runtime: &tokio::runtime::Handle,
    shutdown: &CancellationToken,
    timeout: Duration,
    op: impl FnOnce(CancellationToken) -> F,
) -> Result<T, FsError>
where
    F: Future<Output = Result<T, FsError>>,
{
    let cancel = shutdown.child_token();
    runtime
        .block_on(async { tokio::time::timeout(timeout, op(cancel)).await })
        .unwrap_or(Err(FsError::TimedOut))
}

/// Bridges the node tree to the [`fuser::Filesystem`] trait.
pub struct FuserAdapter<S: SecretStore> {
    table: NodeTable<S>,
    open_files: HashMap<FileHandle, Arc<[u8]>>,
    open_dirs: HashMap<FileHandle, Arc<[DirEntry]>>,
    next_fh: FileHandle,
    runtime: tokio::runtime::Handle,
    shutdown: CancellationToken,
    settings: MountSettings,
    mounted_at: SystemTime,
}

impl<S: SecretStore> FuserAdapter<S> {
    /// Create an adapter serving the tree under `root`.
    ///
    /// Cancelling `shutdown` aborts every in-flight store call.
    pub fn new(
        root: DirNode<S>,
        runtime: tokio::runtime::Handle,
        shutdown: CancellationToken,
        settings: MountSettings,
    ) -> Self {
        Self {
            table: NodeTable::new(root),
            open_files: HashMap::new(),
            open_dirs: HashMap::new(),
            next_fh: 1,
            runtime,
            shutdown,
            settings,
            mounted_at: SystemTime::now(),
        }
    }

    /// Run one store-backed operation, bounded by the request timeout and by shutdown.
    fn block_on<T, F>(&self, op: impl FnOnce(CancellationToken) -> F) -> Result<T, FsError>
    where
        F: Future<Output = Result<T, FsError>>,
    {
        run_bounded(
            &self.runtime,
            &self.shutdown,
            self.settings.request_timeout,
            op,
        )
    }

    fn node(&self, ino: InodeAddr) -> Result<Node<S>, FsError> {
        self.table.get(ino).ok_or(FsError::NotFound)
    }

    fn dir(&self, ino: InodeAddr) -> Result<DirNode<S>, i32> {
        match self.table.get(ino) {
            Some(Node::Dir(dir)) => Ok(dir),
            Some(Node::File(_)) => Err(libc::ENOTDIR),
            None => Err(libc::ENOENT),
        }
    }

    fn fuser_attr(&self, attr: &NodeAttr) -> fuser::FileAttr {
        attr_to_fuser(
            attr,
            self.table.kernel_ino(attr.ino),
            &self.settings,
            self.mounted_at,
        )
    }

    fn allocate_fh(&mut self) -> FileHandle {
        let fh = self.next_fh;
        self.next_fh += 1;
        fh
    }
}

impl<S: SecretStore> fuser::Filesystem for FuserAdapter<S> {
    #[instrument(name = "FuserAdapter::lookup", skip(self, _req, reply))]
    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        let dir = match self.dir(parent) {
            Ok(dir) => dir,
            Err(errno) => return reply.error(errno),
        };
        let Some(name) = name.to_str() else {
            // Store keys are UTF-8; anything else cannot exist.
            return reply.error(libc::ENOENT);
        };

        self.block_on(|cancel| async move { dir.lookup(name, &cancel).await })
            .and_then(|node| Ok((node.attr()?, node)))
            .fuse_reply(reply, |(attr, node), reply| {
                self.table.remember(node);
                let f_attr = self.fuser_attr(&attr);
                debug!(?f_attr, "replying...");
                reply.entry(&self.settings.attr_ttl, &f_attr, 0);
            });
    }

    #[instrument(name = "FuserAdapter::forget", skip(self, _req))]
    fn forget(&mut self, _req: &fuser::Request<'_>, ino: u64, nlookup: u64) {
        self.table.forget(ino, nlookup);
    }

    #[instrument(name = "FuserAdapter::getattr", skip(self, _req, _fh, reply))]
    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        self.node(ino)
            .and_then(|node| node.attr())
            .fuse_reply(reply, |attr, reply| {
                let f_attr = self.fuser_attr(&attr);
                debug!(?f_attr, "replying...");
                reply.attr(&self.settings.attr_ttl, &f_attr);
            });
    }

    #[instrument(name = "FuserAdapter::open", skip(self, _req, reply))]
    fn open(&mut self, _req: &fuser::Request<'_>, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return reply.error(libc::EROFS);
        }
        let content = match self.table.get(ino) {
            Some(Node::File(file)) => file.read(),
            Some(Node::Dir(_)) => return reply.error(libc::EISDIR),
            None => Err(FsError::NotFound),
        };

        content.fuse_reply(reply, |content, reply| {
            let fh = self.allocate_fh();
            self.open_files.insert(fh, Arc::from(content));
            debug!(handle = fh, "replying...");
            reply.opened(fh, 0);
        });
    }

    #[instrument(
        name = "FuserAdapter::read",
        skip(self, _req, _ino, _flags, _lock_owner, reply)
    )]
    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(libc::EINVAL);
        };
        let Some(content) = self.open_files.get(&fh) else {
            return reply.error(libc::EBADF);
        };
        let data = read_window(content, offset, size);
        debug!(read_bytes = data.len(), "replying...");
        reply.data(data);
    }

    #[instrument(
        name = "FuserAdapter::release",
        skip(self, _req, _ino, _flags, _lock_owner, _flush, reply)
    )]
    fn release(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        if self.open_files.remove(&fh).is_some() {
            reply.ok();
        } else {
            debug!("file handle not open, replying error");
            reply.error(libc::EBADF);
        }
    }

    #[instrument(name = "FuserAdapter::opendir", skip(self, _req, _flags, reply))]
    fn opendir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _flags: i32,
        reply: fuser::ReplyOpen,
    ) {
        let dir = match self.dir(ino) {
            Ok(dir) => dir,
            Err(errno) => return reply.error(errno),
        };

        self.block_on(|cancel| async move {
            let children = dir.read_dir_all(&cancel).await?;
            Ok::<_, FsError>((dir, children))
        })
        .fuse_reply(reply, |(dir, children), reply| {
            let own = self.table.kernel_ino(dir.identity().inode());
            let parent_path = dir.identity().path().parent();
            let parent = self.table.kernel_ino(super::inode::inode(
                parent_path.as_str(),
                NodeKind::Directory,
            ));
            let children = children
                .into_iter()
                .map(|entry| DirEntry {
                    ino: self.table.kernel_ino(entry.ino),
                    ..entry
                })
                .collect();

            let fh = self.allocate_fh();
            self.open_dirs
                .insert(fh, Arc::from(listing_with_dots(own, parent, children)));
            debug!(handle = fh, "replying...");
            reply.opened(fh, 0);
        });
    }

    #[instrument(name = "FuserAdapter::readdir", skip(self, _req, _ino, reply))]
    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        let Some(entries) = self.open_dirs.get(&fh) else {
            return reply.error(libc::EBADF);
        };

        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            let Ok(next) = i64::try_from(i + 1) else {
                return reply.error(libc::EIO);
            };
            debug!(name = %entry.name, ino = entry.ino, "adding entry to reply...");
            if reply.add(entry.ino, next, kind_to_fuser(entry.kind), &entry.name) {
                debug!("buffer full for now, stopping readdir");
                break;
            }
        }
        reply.ok();
    }

    #[instrument(name = "FuserAdapter::releasedir", skip(self, _req, _ino, _flags, reply))]
    fn releasedir(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        reply: fuser::ReplyEmpty,
    ) {
        if self.open_dirs.remove(&fh).is_some() {
            reply.ok();
        } else {
            reply.error(libc::EBADF);
        }
    }

    #[instrument(name = "FuserAdapter::statfs", skip(self, _req, _ino, reply))]
    fn statfs(&mut self, _req: &fuser::Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        let files = u64::try_from(self.table.len()).map_or(u64::MAX, |n| n + 1);
        reply.statfs(0, 0, 0, files, 0, BLOCK_SIZE, MAX_NAME_LENGTH, BLOCK_SIZE);
    }

    fn destroy(&mut self) {
        debug!("filesystem destroyed, cancelling in-flight operations");
        self.shutdown.cancel();
    }
}
