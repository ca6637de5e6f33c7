use std::path::PathBuf;

use pen_crypto::CryptoError;
use thiserror::Error;

pub type PenResult<T> = Result<T, PenError>;

#[derive(Debug, Error)]
pub enum PenError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Wrong password, or the container was altered.
    #[error("incorrect password or corrupt data")]
    IncorrectKeyOrCorrupt,

    #[error("passwords don't match")]
    PasswordMismatch,

    #[error("entropy unavailable: {0}")]
    EntropyUnavailable(String),

    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),
}

impl From<CryptoError> for PenError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::IncorrectKeyOrCorrupt => PenError::IncorrectKeyOrCorrupt,
            CryptoError::EntropyUnavailable(msg) => PenError::EntropyUnavailable(msg),
            CryptoError::Kdf(msg) => PenError::Kdf(msg),
            CryptoError::Seal(msg) => PenError::Pipeline(format!("chunk encryption failed: {msg}")),
        }
    }
}

/// Container header rejected before any key derivation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("truncated header: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("wrong magic number in header: {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unsupported format version {found} (supported: 1..={supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// A job failure tagged with the file it concerns.
#[derive(Debug, Error)]
#[error("{}: {source}", path.display())]
pub struct FileError {
    pub path: PathBuf,
    #[source]
    pub source: PenError,
}

impl FileError {
    pub fn new(path: impl Into<PathBuf>, source: PenError) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}
