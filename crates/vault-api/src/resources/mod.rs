//! Resource namespaces for the Vault API.

mod logical;

pub use logical::LogicalResource;
