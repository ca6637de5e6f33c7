//! Per-chunk XChaCha20-Poly1305 sealing/opening
//!
//! Sealed chunk format (binary):
//! ```text
//! [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! ```
//!
//! Every seal draws a fresh nonce from the entropy source. Nonces are never
//! derived from a counter.

use std::sync::Arc;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};

use crate::entropy::EntropySource;
use crate::kdf::Key;
use crate::{CryptoError, CHUNK_OVERHEAD, NONCE_SIZE};

/// A chunk AEAD bound to one file key and one entropy source.
pub struct ChunkCipher {
    aead: XChaCha20Poly1305,
    entropy: Arc<dyn EntropySource>,
}

impl ChunkCipher {
    pub fn new(key: &Key, entropy: Arc<dyn EntropySource>) -> Self {
        Self {
            aead: XChaCha20Poly1305::new(key.as_bytes().into()),
            entropy,
        }
    }

    /// Seal one plaintext chunk.
    ///
    /// Returns: `[24-byte nonce][ciphertext][16-byte tag]`
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.entropy.fill(&mut nonce_bytes)?;
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .aead
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Seal(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open one sealed chunk (`[nonce][ciphertext][tag]`).
    ///
    /// A chunk too short to carry a nonce and tag is reported the same way as
    /// a failed tag check.
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < CHUNK_OVERHEAD {
            return Err(CryptoError::IncorrectKeyOrCorrupt);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = XNonce::from_slice(nonce_bytes);

        self.aead
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::IncorrectKeyOrCorrupt)
    }
}

impl std::fmt::Debug for ChunkCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCipher")
            .field("aead", &"XChaCha20Poly1305")
            .finish_non_exhaustive()
    }
}

/// Seal a single chunk with a one-off cipher.
pub fn seal_chunk(
    key: &Key,
    plaintext: &[u8],
    entropy: Arc<dyn EntropySource>,
) -> Result<Vec<u8>, CryptoError> {
    ChunkCipher::new(key, entropy).seal(plaintext)
}

/// Open a single chunk with a one-off cipher.
pub fn open_chunk(key: &Key, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    // Opening never draws randomness.
    ChunkCipher::new(key, Arc::new(crate::OsEntropy)).open(sealed)
}
