//! In-memory vault backend for tests and single-process deployments.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::VaultBackend;

/// Error type for in-memory backend.
///
/// The in-memory backend cannot fail; the type exists to satisfy the trait.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// TTL does not fit a timestamp.
    #[error("TTL out of range: {0:?}")]
    TtlOutOfRange(Duration),
}

#[derive(Debug, Clone)]
struct StoredValue {
    bytes: Vec<u8>,
    expires_at: DateTime<Utc>,
}

impl StoredValue {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// In-memory vault backend.
///
/// Uses a BTreeMap for deterministic key order. Expiry is lazy: expired
/// values are invisible to reads and dropped by [`purge_expired`](Self::purge_expired).
#[derive(Debug, Default)]
pub struct InMemoryVaultBackend {
    values: RwLock<BTreeMap<String, StoredValue>>,
}

impl InMemoryVaultBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    /// Whether the backend holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Drop expired keys. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut values = self.values.write();
        let before = values.len();
        values.retain(|_, v| v.is_live(now));
        before - values.len()
    }

    /// Raw stored bytes, bypassing expiry (test helper for tampering).
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.values.read().get(key).map(|v| v.bytes.clone())
    }

    /// Overwrite stored bytes in place, keeping the expiry (test helper for tampering).
    pub fn overwrite_raw(&self, key: &str, bytes: Vec<u8>) -> bool {
        match self.values.write().get_mut(key) {
            Some(v) => {
                v.bytes = bytes;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl VaultBackend for InMemoryVaultBackend {
    type Error = InMemoryError;

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), Self::Error> {
        let ttl_chrono = chrono::Duration::from_std(ttl)
            .map_err(|_| InMemoryError::TtlOutOfRange(ttl))?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl_chrono)
            .ok_or(InMemoryError::TtlOutOfRange(ttl))?;

        self.values.write().insert(
            key.to_string(),
            StoredValue { bytes: value, expires_at },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        let now = Utc::now();
        Ok(self.values
            .read()
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.bytes.clone()))
    }

    async fn keys_with_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>, Self::Error> {
        let now = Utc::now();
        Ok(self.values
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, v)| v.is_live(now))
            .take(limit)
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, Self::Error> {
        let now = Utc::now();
        Ok(self.values
            .read()
            .get(key)
            .filter(|v| v.is_live(now))
            .and_then(|v| (v.expires_at - now).to_std().ok()))
    }
}
