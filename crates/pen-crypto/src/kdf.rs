//! Key derivation: Argon2id password + salt → per-file key

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use zeroize::Zeroize;

use crate::{CryptoError, KEY_SIZE, SALT_SIZE};

/// A 256-bit key derived from a password via Argon2id.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct Key {
    bytes: [u8; KEY_SIZE],
}

impl Key {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for Key {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key").field("bytes", &"[REDACTED]").finish()
    }
}

/// Argon2id parameters for KDF.
///
/// None of these are recorded in the container header, so every file must be
/// written and read with the same values. Only tests should construct
/// anything other than [`KdfParams::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / passes (default: 1)
    pub time_cost: u32,
    /// Parallelism (default: available CPU cores, at most 255)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 64 * 1024,
            time_cost: 1,
            parallelism: available_lanes(),
        }
    }
}

fn available_lanes() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, u8::MAX as usize) as u32
}

/// Derive a 256-bit key from a password and salt using Argon2id.
///
/// Deterministic: the same password and salt always yield the same key.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> Result<Key, CryptoError> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::Kdf(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    debug!(
        mem_cost_kib = params.mem_cost_kib,
        time_cost = params.time_cost,
        parallelism = params.parallelism,
        "deriving key"
    );

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::Kdf(format!("Argon2id failed: {e}")))?;

    Ok(Key::from_bytes(key))
}
