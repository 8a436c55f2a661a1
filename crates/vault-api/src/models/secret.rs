//! Secret response envelope.

use serde::Deserialize;

/// The key/value payload of a secret.
pub type SecretData = serde_json::Map<String, serde_json::Value>;

/// The envelope Vault wraps around every logical response.
///
/// Lease fields are logged on read; nothing renews them.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretResponse {
    /// Request identifier assigned by Vault.
    #[serde(default)]
    pub request_id: String,
    /// Lease identifier, empty for static secrets.
    #[serde(default)]
    pub lease_id: String,
    /// Lease duration in seconds.
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the lease can be renewed.
    #[serde(default)]
    pub renewable: bool,
    /// The secret's key/value data. Absent for some endpoints.
    #[serde(default)]
    pub data: Option<SecretData>,
    /// Non-fatal warnings attached by the server.
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// Body returned by Vault alongside non-2xx statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    /// Human readable error messages.
    #[serde(default)]
    pub errors: Vec<String>,
}
