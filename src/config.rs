//! Process configuration from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `VAULT_DEFAULT_TTL_SECS` | 86400 |
//! | `VAULT_ENCRYPTION_KEY` | development key (64 hex chars) |
//! | `VAULT_TIMEOUT_MS` | 2000 |
//! | `DETECTOR_TIMEOUT_MS` | 3000 |
//! | `AUDIT_TIMEOUT_MS` | 500 |
//! | `MIN_DETECTION_SCORE` | 0.4 |
//! | `AUDIT_BUFFER_CAPACITY` | 1000 |
//!
//! Unparsable values fall back to the default. A malformed encryption key is
//! an error, never a silent fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::audit::MemoryAuditRecorder;
use crate::cipher::{ChaChaCipher, CipherError, VaultCipher};
use crate::detect::{DetectorError, DetectorSet};

/// Key used when `VAULT_ENCRYPTION_KEY` is unset. Never use in production.
const DEV_ENCRYPTION_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `VAULT_ENCRYPTION_KEY` is set but malformed.
    #[error("Invalid VAULT_ENCRYPTION_KEY: {0}")]
    InvalidKey(#[from] CipherError),
    /// A built-in detector failed to initialize.
    #[error("Detector initialization failed: {0}")]
    Detector(#[from] DetectorError),
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Runtime configuration for masking and unmasking.
#[derive(Debug, Clone)]
pub struct ShieldConfig {
    /// Lifetime of vault entries.
    pub default_ttl: Duration,
    /// Hex-encoded 32-byte vault key.
    pub encryption_key_hex: String,
    /// Whether the development key is in use.
    pub using_dev_key: bool,
    /// Per-operation vault timeout.
    pub vault_timeout: Duration,
    /// Per-detector timeout.
    pub detector_timeout: Duration,
    /// Audit recording timeout.
    pub audit_timeout: Duration,
    /// Minimum confidence for detected spans.
    pub min_detection_score: f32,
    /// Capacity of the in-memory audit buffer.
    pub audit_buffer_capacity: usize,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(86_400),
            encryption_key_hex: DEV_ENCRYPTION_KEY.to_string(),
            using_dev_key: true,
            vault_timeout: Duration::from_millis(2000),
            detector_timeout: DetectorSet::DEFAULT_TIMEOUT,
            audit_timeout: Duration::from_millis(500),
            min_detection_score: DetectorSet::DEFAULT_MIN_SCORE,
            audit_buffer_capacity: MemoryAuditRecorder::DEFAULT_CAPACITY,
        }
    }
}

impl ShieldConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let (encryption_key_hex, using_dev_key) = match std::env::var("VAULT_ENCRYPTION_KEY") {
            Ok(key) if !key.trim().is_empty() => (key.trim().to_string(), false),
            _ => {
                warn!("VAULT_ENCRYPTION_KEY not set, using development key");
                (DEV_ENCRYPTION_KEY.to_string(), true)
            }
        };

        let config = Self {
            default_ttl: Duration::from_secs(env_or("VAULT_DEFAULT_TTL_SECS", defaults.default_ttl.as_secs())),
            encryption_key_hex,
            using_dev_key,
            vault_timeout: Duration::from_millis(env_or("VAULT_TIMEOUT_MS", 2000)),
            detector_timeout: Duration::from_millis(env_or("DETECTOR_TIMEOUT_MS", 3000)),
            audit_timeout: Duration::from_millis(env_or("AUDIT_TIMEOUT_MS", 500)),
            min_detection_score: env_or("MIN_DETECTION_SCORE", defaults.min_detection_score).clamp(0.0, 1.0),
            audit_buffer_capacity: env_or("AUDIT_BUFFER_CAPACITY", defaults.audit_buffer_capacity),
        };

        // Fail at startup rather than on the first mask.
        config.cipher()?;
        Ok(config)
    }

    /// Build the vault cipher from the configured key.
    pub fn cipher(&self) -> Result<Arc<dyn VaultCipher>, ConfigError> {
        Ok(Arc::new(ChaChaCipher::from_hex(&self.encryption_key_hex)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShieldConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(86_400));
        assert_eq!(config.min_detection_score, 0.4);
        assert!(config.using_dev_key);
        assert!(config.cipher().is_ok());
    }

    #[test]
    fn test_bad_key_rejected() {
        let config = ShieldConfig {
            encryption_key_hex: "not-hex".to_string(),
            ..ShieldConfig::default()
        };
        assert!(matches!(config.cipher(), Err(ConfigError::InvalidKey(_))));
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("PII_VAULT_TEST_UNSET_VARIABLE", 42u64), 42);
    }
}
