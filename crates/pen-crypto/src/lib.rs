//! pen-crypto: primitives for pen's password-based file encryption
//!
//! Architecture: Argon2id password KDF + per-chunk XChaCha20-Poly1305
//!
//! ```text
//! password ──┐
//!            ├─ Argon2id (t=1, m=64 MiB, p=cores) ──▶ Key (256-bit, per file)
//! salt(128B) ┘                                          │
//!                                                       ▼
//!                 chunk_i ──▶ XChaCha20-Poly1305(key, nonce_i = random 192-bit)
//!                                                       │
//!                                                       ▼
//!                               [24-byte nonce_i][ciphertext_i][16-byte tag_i]
//! ```
//!
//! Randomness is never read from a global: salts and nonces come from an
//! [`EntropySource`] handed in by the caller.

pub mod chunk;
pub mod entropy;
pub mod error;
pub mod kdf;

pub use chunk::{open_chunk, seal_chunk, ChunkCipher};
pub use entropy::{fresh_salt, EntropySource, OsEntropy, SeededEntropy};
pub use error::CryptoError;
pub use kdf::{derive_key, KdfParams, Key};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the per-file KDF salt
pub const SALT_SIZE: usize = 128;

/// Bytes a sealed chunk adds on top of its plaintext
pub const CHUNK_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;
