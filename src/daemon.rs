//! Mount lifecycle: prepare the mount point, serve until a signal arrives, unmount.

use std::sync::Arc;

use thiserror::Error;
use tokio::select;
use tracing::{debug, error, info};

use vault_api::{Vault, VaultError};
use vault_fs::fs::{FsError, VaultFs};

use crate::app_config;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("no Vault token configured")]
    MissingToken,

    #[error("failed to build the Vault client: {0}")]
    Client(#[from] VaultError),

    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mount task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Prepares the mount point directory.
///
/// - If the directory exists and is non-empty, returns an error.
/// - If the directory does not exist, creates it (including parents) and logs an info message.
/// - If the directory exists and is empty, does nothing.
async fn prepare_mount_point(mount_point: &std::path::Path) -> Result<(), std::io::Error> {
    match tokio::fs::read_dir(mount_point).await {
        Ok(mut entries) => {
            if entries.next_entry().await?.is_some() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!(
                        "Mount point '{}' already exists and is not empty.",
                        mount_point.display()
                    ),
                ));
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(mount_point).await?;
            info!(path = %mount_point.display(), "Created mount point directory.");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn wait_for_exit() -> Result<(), std::io::Error> {
    use tokio::signal;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sighup = signal::unix::signal(signal::unix::SignalKind::hangup())?;
    select! {
        _ = signal::ctrl_c() => {
            debug!("Received Ctrl+C signal, shutting down...");
        },
        _ = sigterm.recv() => {
            debug!("Received termination signal, shutting down...");
        },
        _ = sighup.recv() => {
            debug!("Received hangup signal, shutting down...");
        },
    }
    Ok(())
}

fn build_fs(config: &app_config::Config) -> Result<VaultFs<Vault>, DaemonError> {
    let token = config.vault.token.clone().ok_or(DaemonError::MissingToken)?;
    let fs = VaultFs::new(
        &config.client_config(),
        config.mount_point.clone(),
        token,
        &config.prefix,
    )?;
    Ok(fs.with_settings(config.mount_settings()))
}

/// Main entry point for the daemon.
pub async fn run(
    config: app_config::Config,
    handle: tokio::runtime::Handle,
) -> Result<(), DaemonError> {
    prepare_mount_point(&config.mount_point).await?;
    let fs = Arc::new(build_fs(&config)?);

    info!(
        mount_point = %config.mount_point.display(),
        address = %config.vault.address,
        prefix = %config.prefix,
        "Mounting filesystem."
    );

    let mut serve = tokio::task::spawn_blocking({
        let fs = Arc::clone(&fs);
        move || fs.mount(handle)
    });

    select! {
        served = &mut serve => {
            // The mount ended on its own: a failed mount, or an external unmount.
            return Ok(served??);
        },
        exit = wait_for_exit() => exit?,
    }

    info!("Unmounting filesystem.");
    // Also stops a mount that has not registered its session yet.
    tokio::task::spawn_blocking({
        let fs = Arc::clone(&fs);
        move || fs.shutdown()
    })
    .await??;

    if let Err(e) = serve.await? {
        error!(error = %e, "serve loop reported an error after unmount");
    }
    Ok(())
}

pub fn spawn(config: app_config::Config) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config, runtime.handle().clone()))
}
