//! Vault backing stores.
//!
//! Any key/value store with per-key expiry can back the vault. Values reaching
//! a backend are already encrypted; backends never see plaintext.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::time::Duration;

use async_trait::async_trait;

/// Trait for vault backing stores.
///
/// Expired keys must behave exactly like missing keys for `get`, `ttl` and
/// `keys_with_prefix`. Key enumeration must be ordered for determinism.
#[async_trait]
pub trait VaultBackend: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Store `value` under `key`, replacing any previous value, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), Self::Error>;

    /// Fetch a live value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error>;

    /// List live keys starting with `prefix`, ordered, at most `limit`.
    async fn keys_with_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>, Self::Error>;

    /// Remaining lifetime of a live key.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Self::Error>;

    /// Whether the store is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

pub use memory::InMemoryVaultBackend;

#[cfg(feature = "postgres")]
pub use postgres::PostgresVaultBackend;
