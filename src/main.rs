//! Mount a Vault secret tree as a read-only filesystem.
use std::path::PathBuf;

use clap::Parser;
use secrecy::SecretString;
use tracing::{debug, error};

mod app_config;
mod daemon;
mod trc;

use crate::app_config::{Config, Overrides};
use crate::trc::Trc;

#[derive(Parser)]
#[command(version, about = "Browse HashiCorp Vault secrets as plain files.")]
struct Args {
    #[arg(
        short,
        long,
        value_parser,
        help = "Optional path to a vault-fs config TOML."
    )]
    config_path: Option<PathBuf>,

    /// Where to mount the filesystem.
    mount_point: Option<PathBuf>,

    /// Store path exposed at the mount root, e.g. `secret` or `kv/team`.
    #[arg(short, long)]
    prefix: Option<String>,

    /// Vault server address.
    #[arg(long, env = "VAULT_ADDR")]
    address: Option<String>,

    /// Vault token.
    #[arg(long, env = "VAULT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Vault Enterprise namespace.
    #[arg(long, env = "VAULT_NAMESPACE")]
    namespace: Option<String>,

    /// Plain log output, without spinners or colors.
    #[arg(long)]
    plain_logs: bool,
}

/// Main entry point for the application.
fn main() {
    let args = Args::parse();

    let mut trc = Trc::default();
    if args.plain_logs {
        trc = trc.plain();
    }
    if let Err(e) = trc.init() {
        eprintln!(
            "Failed to initialize logging. Without logging, we can't provide any useful error \
             messages, so we have to exit: {e}"
        );
        std::process::exit(1);
    }

    let config = match Config::load_or_default(args.config_path.as_deref()) {
        Ok(config) => config.with_overrides(Overrides {
            address: args.address,
            token: args.token.map(SecretString::from),
            namespace: args.namespace,
            prefix: args.prefix,
            mount_point: args.mount_point,
        }),
        Err(e) => {
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Err(error_messages) = config.validate() {
        error!("Configuration is invalid.");
        for msg in &error_messages {
            error!(" - {msg}");
        }
        std::process::exit(1);
    }

    debug!(config = ?config, "Starting with configuration...");
    if let Err(e) = daemon::spawn(config) {
        error!("Daemon failed: {e}");
        std::process::exit(1);
    }
}
