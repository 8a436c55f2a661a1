//! The mountable filesystem root.
//!
//! [`VaultFs`] owns the store handle, the prefix the tree is rooted at and, while mounted,
//! the kernel connection. [`VaultFs::mount`] blocks the calling thread for the lifetime of
//! the mount; [`VaultFs::unmount`] is called from elsewhere to end it.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use nix::errno::Errno;
use parking_lot::Mutex;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vault_api::{ClientBuilder, ClientConfig, Vault, VaultError};

use super::fuser::{FuserAdapter, MountSettings};
use super::{DirNode, FsError, NodePath};
use crate::store::SecretStore;

/// File system name reported to the kernel.
const FS_NAME: &str = "vault";

/// A live kernel connection.
struct Connection {
    unmounter: fuser::SessionUnmounter,
    /// Receives the serve loop's exit status once it returns.
    exited: mpsc::Receiver<io::Result<()>>,
    shutdown: CancellationToken,
}

/// Mount state guarded by a single lock, so a shutdown cannot slip in between mounting and
/// registering the connection.
#[derive(Default)]
struct Slot {
    conn: Option<Connection>,
    /// Set by [`VaultFs::shutdown`]; once set, the filesystem never mounts again.
    stopped: bool,
}

/// A read-only filesystem view of a secret store.
pub struct VaultFs<S: SecretStore> {
    store: Arc<S>,
    prefix: String,
    mountpoint: PathBuf,
    settings: MountSettings,
    slot: Mutex<Slot>,
}

impl VaultFs<Vault> {
    /// Build a filesystem over the Vault server described by `config`, authenticated with
    /// `token`, exposing the subtree at `prefix`.
    pub fn new(
        config: &ClientConfig,
        mountpoint: impl Into<PathBuf>,
        token: SecretString,
        prefix: &str,
    ) -> Result<Self, VaultError> {
        let client = ClientBuilder::new(config.clone()).token(token).build()?;
        Ok(Self::with_store(client, mountpoint, prefix))
    }
}

impl<S: SecretStore> VaultFs<S> {
    /// Build a filesystem over any store.
    pub fn with_store(store: S, mountpoint: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            store: Arc::new(store),
            prefix: prefix.to_owned(),
            mountpoint: mountpoint.into(),
            settings: MountSettings::default(),
            slot: Mutex::new(Slot::default()),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: MountSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The root directory node. Its path is the normalized prefix and its name is empty.
    #[must_use]
    pub fn root(&self) -> DirNode<S> {
        DirNode::new(NodePath::root(&self.prefix), Arc::clone(&self.store))
    }

    #[must_use]
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    #[must_use]
    pub fn settings(&self) -> &MountSettings {
        &self.settings
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.slot.lock().conn.is_some()
    }

    /// Mount the filesystem and serve kernel requests until it is unmounted.
    ///
    /// Store calls run on `runtime`. Blocks the calling thread, which must not be a runtime
    /// worker. Returns immediately, without mounting, after [`VaultFs::shutdown`].
    pub fn mount(&self, runtime: tokio::runtime::Handle) -> Result<(), FsError> {
        let (exited_tx, exited_rx) = mpsc::channel();
        let mut session = {
            let mut slot = self.slot.lock();
            if slot.stopped {
                info!(
                    mountpoint = %self.mountpoint.display(),
                    "shutdown requested, not mounting"
                );
                return Ok(());
            }
            if slot.conn.is_some() {
                return Err(FsError::Mount(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("already mounted at '{}'", self.mountpoint.display()),
                )));
            }

            let shutdown = CancellationToken::new();
            let adapter = FuserAdapter::new(
                self.root(),
                runtime,
                shutdown.clone(),
                self.settings.clone(),
            );
            let mut session = fuser::Session::new(adapter, &self.mountpoint, &mount_options())
                .map_err(|e| {
                    error!(mountpoint = %self.mountpoint.display(), error = %e, "mount failed");
                    FsError::Mount(e)
                })?;
            slot.conn = Some(Connection {
                unmounter: session.unmount_callable(),
                exited: exited_rx,
                shutdown,
            });
            session
        };

        info!(
            mountpoint = %self.mountpoint.display(),
            prefix = %NodePath::root(&self.prefix),
            "serving filesystem"
        );
        let result = session.run();
        drop(session);

        // An unmount issued through `unmount` has already taken the connection; one that
        // came from outside (`umount`, `fusermount -u`) has not.
        if let Some(conn) = self.slot.lock().conn.take() {
            conn.shutdown.cancel();
        }

        let report = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        if exited_tx.send(report).is_err() {
            debug!("nobody waiting for serve loop exit");
        }

        match result {
            Ok(()) => {
                info!(mountpoint = %self.mountpoint.display(), "filesystem unmounted");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "serve loop failed");
                Err(FsError::Mount(e))
            }
        }
    }

    /// Cancel in-flight operations, detach from the kernel and wait for the serve loop to
    /// exit.
    pub fn unmount(&self) -> Result<(), FsError> {
        let conn = self.slot.lock().conn.take().ok_or(FsError::NotMounted)?;
        self.disconnect(conn)
    }

    /// Stop the filesystem for good: unmount it if mounted, and keep a mount that has not
    /// registered yet from ever serving.
    pub fn shutdown(&self) -> Result<(), FsError> {
        let conn = {
            let mut slot = self.slot.lock();
            slot.stopped = true;
            slot.conn.take()
        };
        match conn {
            Some(conn) => self.disconnect(conn),
            None => {
                debug!(mountpoint = %self.mountpoint.display(), "shutdown before mount");
                Ok(())
            }
        }
    }

    fn disconnect(&self, mut conn: Connection) -> Result<(), FsError> {
        debug!(mountpoint = %self.mountpoint.display(), "unmounting");
        conn.shutdown.cancel();
        if let Err(e) = conn.unmounter.unmount() {
            warn!(error = %e, "session unmount failed, forcing");
            force_unmount(&self.mountpoint).map_err(FsError::Mount)?;
        }

        match conn.exited.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(FsError::Mount(e)),
            Err(mpsc::RecvError) => Err(FsError::Mount(io::Error::other(
                "serve loop exited without reporting",
            ))),
        }
    }
}

fn mount_options() -> Vec<fuser::MountOption> {
    let mut opts = vec![
        fuser::MountOption::FSName(FS_NAME.to_owned()),
        fuser::MountOption::Subtype("vault-fs".to_owned()),
        fuser::MountOption::RO,
        fuser::MountOption::NoDev,
        fuser::MountOption::NoSuid,
        fuser::MountOption::DefaultPermissions,
    ];
    if cfg!(target_os = "macos") {
        opts.push(fuser::MountOption::CUSTOM(format!("volname={FS_NAME}")));
    }
    opts
}

/// Detach the mount at `mountpoint` when the session could not do it, retrying while busy.
fn force_unmount(mountpoint: &Path) -> io::Result<()> {
    const ATTEMPTS: usize = 10;
    const DELAY: Duration = Duration::from_millis(10);

    for attempt in 1..=ATTEMPTS {
        let result = {
            #[cfg(target_os = "macos")]
            {
                nix::mount::unmount(mountpoint, nix::mount::MntFlags::MNT_FORCE)
            }

            #[cfg(not(target_os = "macos"))]
            {
                nix::mount::umount2(mountpoint, nix::mount::MntFlags::MNT_DETACH)
            }
        };

        match result {
            Ok(()) => {
                debug!(attempt, "forced unmount succeeded");
                return Ok(());
            }
            Err(Errno::EBUSY) => {
                debug!(attempt, "mount still busy, retrying");
                std::thread::sleep(DELAY);
            }
            Err(Errno::EINVAL | Errno::ENOENT) => {
                debug!(attempt, "already unmounted");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(Errno::EBUSY.into())
}
