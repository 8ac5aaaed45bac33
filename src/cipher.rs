//! Authenticated encryption for vault payloads.
//!
//! The vault treats the cipher as an opaque box behind [`VaultCipher`]:
//! encrypt bytes, decrypt bytes, fail on tampered or foreign ciphertext.
//! [`ChaChaCipher`] is the provided implementation.
//!
//! ## Wire Format
//!
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

/// Key size in bytes.
pub const KEY_SIZE: usize = 32;
/// Nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// Error type for cipher operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CipherError {
    /// Key material is malformed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    /// Encryption failed.
    #[error("Encryption failed")]
    Encrypt,
    /// Ciphertext is truncated, tampered, or was sealed under another key.
    #[error("Decryption failed")]
    Decrypt,
}

/// Opaque authenticated-encryption primitive.
pub trait VaultCipher: Send + Sync {
    /// Seal plaintext.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    /// Open ciphertext produced by `encrypt` under the same key.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// ChaCha20-Poly1305 with a random nonce per message.
#[derive(Clone)]
pub struct ChaChaCipher {
    cipher: ChaCha20Poly1305,
}

impl ChaChaCipher {
    /// Create a cipher from raw key bytes.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Create a cipher from a 64-character hex key.
    pub fn from_hex(hex_key: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            CipherError::InvalidKey(format!("expected {} bytes, got {}", KEY_SIZE, b.len()))
        })?;
        Ok(Self::new(&key))
    }
}

impl std::fmt::Debug for ChaChaCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaChaCipher").finish_non_exhaustive()
    }
}

impl VaultCipher for ChaChaCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(CipherError::Decrypt);
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::Decrypt)
    }
}
