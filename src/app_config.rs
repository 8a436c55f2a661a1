//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file. Command line flags and the
//! usual `VAULT_*` environment variables override whatever the file says.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vault_api::ClientConfig;
use vault_fs::fs::MountSettings;

fn vault_fs_runtime_dir() -> Option<PathBuf> {
    let runtime_dir = dirs::runtime_dir();
    if let Some(path) = runtime_dir {
        return Some(path.join("vault-fs"));
    }

    let home_dir = dirs::home_dir();
    if let Some(path) = home_dir {
        return Some(path.join(".local").join("share").join("vault-fs"));
    }

    None
}

fn default_mount_point() -> PathBuf {
    vault_fs_runtime_dir().map_or_else(|| PathBuf::from("/tmp/vault-fs/mnt"), |rd| rd.join("mnt"))
}

fn default_address() -> String {
    "http://127.0.0.1:8200".to_owned()
}

fn default_prefix() -> String {
    "/secret".to_owned()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_attr_ttl_secs() -> u64 {
    1
}

fn current_uid() -> u32 {
    nix::unistd::Uid::current().as_raw()
}

fn current_gid() -> u32 {
    nix::unistd::Gid::current().as_raw()
}

fn serialize_token<S>(token: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match token {
        Some(_) => serializer.serialize_str("****"),
        None => serializer.serialize_none(),
    }
}

/// How to reach and authenticate against the Vault server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VaultConfig {
    /// Base address of the server.
    #[serde(default = "default_address")]
    pub address: String,

    /// The token sent with every request. Usually supplied through `VAULT_TOKEN` instead.
    #[serde(default, serialize_with = "serialize_token")]
    pub token: Option<SecretString>,

    /// Enterprise namespace.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Disable TLS certificate verification.
    #[serde(default)]
    pub skip_verify: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            token: None,
            namespace: None,
            skip_verify: false,
        }
    }
}

/// Application configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,

    /// The store path exposed at the mount root.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// The mount point for the filesystem.
    #[serde(default = "default_mount_point")]
    pub mount_point: PathBuf,

    /// The user owning every node. If not specified, the current user.
    #[serde(default = "current_uid")]
    pub uid: u32,

    /// The group owning every node. If not specified, the current group.
    #[serde(default = "current_gid")]
    pub gid: u32,

    /// Upper bound, in seconds, on a single store request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long, in seconds, the kernel may cache attributes and lookups.
    #[serde(default = "default_attr_ttl_secs")]
    pub attr_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault: VaultConfig::default(),
            prefix: default_prefix(),
            mount_point: default_mount_point(),
            uid: current_uid(),
            gid: current_gid(),
            request_timeout_secs: default_request_timeout_secs(),
            attr_ttl_secs: default_attr_ttl_secs(),
        }
    }
}

/// Values given on the command line or through the environment. `None` leaves the file
/// value untouched.
#[derive(Debug, Default)]
pub struct Overrides {
    pub address: Option<String>,
    pub token: Option<SecretString>,
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub mount_point: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing every validation error message otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let address = &self.vault.address;
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            errors.push(format!("Vault address '{address}' must start with http:// or https://."));
        }

        if self.vault.token.is_none() {
            errors.push("No Vault token given. Set VAULT_TOKEN or pass --token.".to_owned());
        }

        if self
            .prefix
            .split('/')
            .any(|segment| segment == "." || segment == "..")
        {
            errors.push(format!(
                "Prefix '{}' must not contain '.' or '..' segments.",
                self.prefix
            ));
        }

        if !self.mount_point.is_absolute() {
            errors.push(format!(
                "Mount point '{}' must be an absolute path.",
                self.mount_point.display()
            ));
        }

        if self.request_timeout_secs == 0 {
            errors.push("request-timeout-secs must be greater than zero.".to_owned());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Apply command line and environment overrides on top of the loaded file.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(address) = overrides.address {
            self.vault.address = address;
        }
        if let Some(token) = overrides.token {
            self.vault.token = Some(token);
        }
        if let Some(namespace) = overrides.namespace {
            self.vault.namespace = Some(namespace);
        }
        if let Some(prefix) = overrides.prefix {
            self.prefix = prefix;
        }
        if let Some(mount_point) = overrides.mount_point {
            self.mount_point = mount_point;
        }
        self
    }

    /// Connection settings for the Vault client.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            address: self.vault.address.clone(),
            namespace: self.vault.namespace.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            skip_verify: self.vault.skip_verify,
        }
    }

    /// Ownership and timing settings for the mounted tree.
    #[must_use]
    pub fn mount_settings(&self) -> MountSettings {
        MountSettings {
            uid: self.uid,
            gid: self.gid,
            attr_ttl: Duration::from_secs(self.attr_ttl_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("vault-fs").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("vault-fs").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/vault-fs/config.toml"));

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads configuration from the first found config file, or the external path if given.
    pub fn load(external_config_path: Option<&Path>) -> Option<Result<Self, ConfigError>> {
        if let Some(path) = external_config_path {
            return Some(Self::load_from_file(path));
        }

        Self::find_config_file().map(|path| Self::load_from_file(&path))
    }

    /// Loads config, falling back to defaults when no file exists.
    /// Errors if a config file exists but is malformed.
    pub fn load_or_default(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match Self::load(external_config_path) {
            Some(res) => {
                let config = res?;
                debug!("Loaded configuration successfully.");
                Ok(config)
            }
            None => {
                debug!("No configuration file found, using defaults.");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use secrecy::ExposeSecret as _;

    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn valid() -> Config {
        Config {
            vault: VaultConfig {
                token: Some(SecretString::from("s.token")),
                ..VaultConfig::default()
            },
            mount_point: PathBuf::from("/mnt/vault"),
            ..Config::default()
        }
    }

    #[test]
    fn file_values_are_loaded() {
        let (_dir, path) = write_config(
            r#"
            prefix = "kv/team"
            mount-point = "/mnt/team"
            uid = 1000
            gid = 1000
            request-timeout-secs = 5

            [vault]
            address = "https://vault.example.com:8200"
            token = "s.abc"
            namespace = "eng"
            "#,
        );
        let config = Config::load_or_default(Some(&path)).unwrap();

        assert_eq!(config.prefix, "kv/team");
        assert_eq!(config.mount_point, PathBuf::from("/mnt/team"));
        assert_eq!(config.vault.address, "https://vault.example.com:8200");
        assert_eq!(config.vault.token.as_ref().unwrap().expose_secret(), "s.abc");
        assert_eq!(config.vault.namespace.as_deref(), Some("eng"));
        assert_eq!(config.mount_settings().uid, 1000);
        assert_eq!(config.client_config().timeout, Duration::from_secs(5));
        assert_eq!(config.attr_ttl_secs, 1);
    }

    #[test]
    fn missing_keys_take_defaults() {
        let (_dir, path) = write_config("");
        let config = Config::load_or_default(Some(&path)).unwrap();

        assert_eq!(config.prefix, "/secret");
        assert_eq!(config.vault.address, "http://127.0.0.1:8200");
        assert!(config.vault.token.is_none());
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let (_dir, path) = write_config("prefix = [");
        let err = Config::load_or_default(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::DeserializationError(_)), "{err}");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_or_default(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)), "{err}");
    }

    #[test]
    fn overrides_win_over_file() {
        let config = valid().with_overrides(Overrides {
            address: Some("https://other:8200".to_owned()),
            prefix: Some("kv".to_owned()),
            ..Overrides::default()
        });
        assert_eq!(config.vault.address, "https://other:8200");
        assert_eq!(config.prefix, "kv");
        assert_eq!(config.mount_point, PathBuf::from("/mnt/vault"));
    }

    #[test]
    fn validation_collects_every_problem() {
        let config = Config {
            vault: VaultConfig {
                address: "vault:8200".to_owned(),
                ..VaultConfig::default()
            },
            prefix: "/secret/../sys".to_owned(),
            mount_point: PathBuf::from("relative"),
            request_timeout_secs: 0,
            ..Config::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5, "{errors:?}");
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn token_is_redacted_when_serialized() {
        let rendered = toml::to_string(&valid()).unwrap();
        assert!(rendered.contains("****"), "{rendered}");
        assert!(!rendered.contains("s.token"), "{rendered}");
    }
}
