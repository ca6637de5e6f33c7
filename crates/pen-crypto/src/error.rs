use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// Authentication failed. A wrong password and a tampered chunk are
    /// indistinguishable here.
    #[error("incorrect password or corrupt data")]
    IncorrectKeyOrCorrupt,

    #[error("entropy unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("chunk encryption failed: {0}")]
    Seal(String),
}
