//! Container header codec and chunk framing
//!
//! On-disk layout (big-endian integers):
//! ```text
//! offset 0    magic    u32        0xC0FFEE11
//! offset 4    version  u32        FORMAT_VERSION
//! offset 8    salt     [u8; 128]
//! offset 136  chunk_0 || chunk_1 || ... || chunk_last
//!             chunk = [24-byte nonce][ciphertext][16-byte tag]
//! ```
//!
//! Every chunk except the last carries exactly `chunk_size` bytes of
//! plaintext, so chunk boundaries follow from the chunk size alone.

use pen_crypto::{CHUNK_OVERHEAD, SALT_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::VersionPolicy;
use crate::error::{FormatError, PenError, PenResult};
use crate::types::Mode;

/// Identifies a pen container.
pub const MAGIC: u32 = 0xC0FF_EE11;

/// Newest header/framing layout this build writes and reads.
pub const FORMAT_VERSION: u32 = 1;

pub const HEADER_LEN: usize = 4 + 4 + SALT_SIZE;

/// Plaintext bytes per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

#[derive(Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub salt: [u8; SALT_SIZE],
}

impl Header {
    /// A header for a new container at the current format version.
    pub fn new(salt: [u8; SALT_SIZE]) -> Self {
        Self {
            version: FORMAT_VERSION,
            salt,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        buf[4..8].copy_from_slice(&self.version.to_be_bytes());
        buf[8..].copy_from_slice(&self.salt);
        buf
    }

    /// Validate and decode a header.
    ///
    /// Checks run in order: length, magic, version. Nothing past the magic is
    /// interpreted unless the magic matches.
    pub fn parse(bytes: &[u8], policy: VersionPolicy) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_LEN {
            return Err(FormatError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != MAGIC {
            return Err(FormatError::BadMagic { found: magic });
        }

        let version = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        match policy {
            VersionPolicy::Enforce if version == 0 || version > FORMAT_VERSION => {
                return Err(FormatError::UnsupportedVersion {
                    found: version,
                    supported: FORMAT_VERSION,
                });
            }
            VersionPolicy::Ignore if version != FORMAT_VERSION => {
                debug!(version, "version check disabled, reading anyway");
            }
            _ => {}
        }

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[8..HEADER_LEN]);
        Ok(Self { version, salt })
    }

    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await
    }

    /// Read exactly [`HEADER_LEN`] bytes and validate them.
    ///
    /// A stream that ends early is a [`FormatError::Truncated`], not an I/O
    /// error. On success the reader is positioned at the first chunk.
    pub async fn read_from<R>(reader: &mut R, policy: VersionPolicy) -> PenResult<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(Self::parse(&buf[..filled], policy)?)
    }
}

impl std::fmt::Debug for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Header")
            .field("version", &self.version)
            .field("salt", &format_args!("[{} bytes]", SALT_SIZE))
            .finish()
    }
}

/// Chunk geometry for a given plaintext chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    chunk_size: usize,
}

impl Default for Framing {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Framing {
    /// `chunk_size` must be at least 1.
    pub fn new(chunk_size: usize) -> PenResult<Self> {
        if chunk_size == 0 {
            return Err(PenError::Config("chunk size must be at least 1".into()));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes the chunker reads per chunk in the given mode.
    pub fn read_size(&self, mode: Mode) -> usize {
        match mode {
            Mode::Encrypt => self.chunk_size,
            Mode::Decrypt => self.chunk_size + CHUNK_OVERHEAD,
        }
    }

    /// Number of chunks a plaintext of `plain_len` bytes splits into.
    pub fn chunk_count(&self, plain_len: u64) -> u64 {
        plain_len.div_ceil(self.chunk_size as u64)
    }

    /// Exact body length (excluding the header) of a sealed stream.
    pub fn sealed_len(&self, plain_len: u64) -> u64 {
        plain_len + self.chunk_count(plain_len) * CHUNK_OVERHEAD as u64
    }
}
