//! pen-core: container format, streaming pipeline, and conversion orchestration
//!
//! ```text
//! Converter ─▶ container::Header (read or write)
//!           ─▶ pen_crypto::derive_key (once per file, blocking pool)
//!           ─▶ pipeline::run: chunker ─▶ transformer (seal/open) ─▶ committer
//!           ─▶ two-phase commit: flush + sync + verify, then remove the source
//! ```

pub mod config;
pub mod container;
pub mod convert;
pub mod error;
pub mod password;
pub mod pipeline;
pub mod types;

pub use config::{PenConfig, VersionPolicy};
pub use container::{Framing, Header, DEFAULT_CHUNK_SIZE, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use convert::{ConvertOptions, Converter, Job, Outcome};
pub use error::{FileError, FormatError, PenError, PenResult};
pub use password::{obtain_password, PasswordSource};
pub use pipeline::PipelineStats;
pub use types::{JobState, Mode};
