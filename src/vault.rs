//! Encrypted, session-scoped, time-limited token vault.
//!
//! ## Key Layout
//!
//! `session:{session_id}:{token_id}` → `encrypt(json(VaultEntry))`
//!
//! ## Read Semantics
//!
//! A missing key, an expired key and an entry that fails to decrypt or parse
//! all read as absent. Callers cannot tell them apart, so the vault never acts
//! as an oracle for which tokens once existed. Only backend unavailability is
//! reported as an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cipher::{CipherError, VaultCipher};
use crate::store::VaultBackend;
use crate::types::{TokenId, VaultEntry};

/// Prefix shared by every vault key.
pub const KEY_PREFIX: &str = "session:";

/// Build the backend key for a token.
pub fn vault_key(session_id: &str, token_id: &TokenId) -> String {
    format!("{}{}:{}", KEY_PREFIX, session_id, token_id.as_str())
}

/// Error type for vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Backing store failed.
    #[error("Vault backend error: {0}")]
    Backend(String),
    /// Backing store did not answer in time.
    #[error("Vault backend timed out after {0:?}")]
    Timeout(Duration),
    /// Entry could not be sealed.
    #[error("Vault cipher error: {0}")]
    Cipher(#[from] CipherError),
    /// Entry could not be serialized.
    #[error("Vault serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VaultError {
    /// Create a backend error from any error type.
    pub fn from_backend<E: std::error::Error>(e: E) -> Self {
        Self::Backend(e.to_string())
    }
}

/// One row of an administrative listing.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum VaultListing {
    /// Entry decrypted successfully.
    Entry {
        /// Backend key.
        key: String,
        /// Decrypted entry.
        data: VaultEntry,
        /// Remaining lifetime in seconds, if known.
        ttl: Option<u64>,
    },
    /// Entry could not be read.
    Error {
        /// Backend key.
        key: String,
        /// Error marker.
        error: String,
    },
}

impl VaultListing {
    /// Backend key of this row.
    pub fn key(&self) -> &str {
        match self {
            Self::Entry { key, .. } | Self::Error { key, .. } => key,
        }
    }
}

/// Vault store: cipher + backing store + timeouts.
pub struct VaultStore<B: VaultBackend> {
    backend: Arc<B>,
    cipher: Arc<dyn VaultCipher>,
    default_ttl: Duration,
    op_timeout: Duration,
}

impl<B: VaultBackend> Clone for VaultStore<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            cipher: Arc::clone(&self.cipher),
            default_ttl: self.default_ttl,
            op_timeout: self.op_timeout,
        }
    }
}

impl<B: VaultBackend> VaultStore<B> {
    /// Default entry lifetime (24 hours).
    pub const DEFAULT_TTL: Duration = Duration::from_secs(86_400);
    /// Default per-operation backend timeout.
    pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);

    /// Create a vault with default TTL and timeout.
    pub fn new(backend: Arc<B>, cipher: Arc<dyn VaultCipher>) -> Self {
        Self {
            backend,
            cipher,
            default_ttl: Self::DEFAULT_TTL,
            op_timeout: Self::DEFAULT_OP_TIMEOUT,
        }
    }

    /// Override the default entry lifetime.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Override the per-operation backend timeout.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Default entry lifetime.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get the backing store.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, VaultError>
    where
        F: std::future::Future<Output = Result<T, B::Error>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(VaultError::from_backend),
            Err(_) => Err(VaultError::Timeout(self.op_timeout)),
        }
    }

    /// Seal and store an entry. Overwrites are allowed.
    pub async fn put(
        &self,
        session_id: &str,
        token_id: &TokenId,
        entry: &VaultEntry,
        ttl: Duration,
    ) -> Result<(), VaultError> {
        let key = vault_key(session_id, token_id);
        let plaintext = serde_json::to_vec(entry)?;
        let sealed = self.cipher.encrypt(&plaintext)?;

        self.bounded(self.backend.set_with_ttl(&key, sealed, ttl)).await?;

        debug!(
            session_id = %session_id,
            token_id = %token_id,
            ttl_secs = ttl.as_secs(),
            "Vault entry stored"
        );
        Ok(())
    }

    /// Fetch and open an entry.
    ///
    /// Returns `Ok(None)` for missing, expired and unreadable entries alike,
    /// and for entries whose session or token id differs from the key.
    pub async fn get(&self, session_id: &str, token_id: &TokenId) -> Result<Option<VaultEntry>, VaultError> {
        let key = vault_key(session_id, token_id);
        let Some(sealed) = self.bounded(self.backend.get(&key)).await? else {
            return Ok(None);
        };

        match self.open(&sealed) {
            Ok(entry) if entry.session_id == session_id && entry.token_id == *token_id => Ok(Some(entry)),
            Ok(entry) => {
                warn!(
                    session_id = %session_id,
                    token_id = %token_id,
                    stored_session_id = %entry.session_id,
                    stored_token_id = %entry.token_id,
                    "Vault entry does not belong to its key, treating as absent"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    token_id = %token_id,
                    error = %e,
                    "Vault entry unreadable, treating as absent"
                );
                Ok(None)
            }
        }
    }

    /// Administrative listing of up to `limit` entries.
    ///
    /// Best effort: a bad entry yields a [`VaultListing::Error`] row instead
    /// of aborting, and a failed key scan yields an empty listing.
    pub async fn list(&self, limit: usize) -> Vec<VaultListing> {
        let keys = match self.bounded(self.backend.keys_with_prefix(KEY_PREFIX, limit)).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Vault listing failed");
                return Vec::new();
            }
        };

        let mut rows = Vec::with_capacity(keys.len());
        for key in keys.into_iter().take(limit) {
            let sealed = match self.bounded(self.backend.get(&key)).await {
                Ok(Some(sealed)) => sealed,
                // Expired between scan and read.
                Ok(None) => continue,
                Err(e) => {
                    rows.push(VaultListing::Error { key, error: e.to_string() });
                    continue;
                }
            };

            match self.open(&sealed) {
                Ok(data) => {
                    // Fall back to the entry's own expiry when the backend cannot say.
                    let remaining = match self.bounded(self.backend.ttl(&key)).await {
                        Ok(Some(d)) => Some(d),
                        _ => (data.expires_at() - Utc::now()).to_std().ok(),
                    };
                    let ttl = remaining.map(|d| d.as_secs());
                    rows.push(VaultListing::Entry { key, data, ttl });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to decrypt vault entry");
                    rows.push(VaultListing::Error {
                        key,
                        error: "Decryption failed".to_string(),
                    });
                }
            }
        }
        rows
    }

    /// Whether the backing store is reachable within the timeout.
    pub async fn is_healthy(&self) -> bool {
        tokio::time::timeout(self.op_timeout, self.backend.is_healthy())
            .await
            .unwrap_or(false)
    }

    fn open(&self, sealed: &[u8]) -> Result<VaultEntry, VaultError> {
        let plaintext = self.cipher.decrypt(sealed)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}
