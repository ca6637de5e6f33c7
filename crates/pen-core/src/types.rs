use std::fmt;

/// Direction of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Plaintext in, container out
    Encrypt,
    /// Container in, plaintext out
    Decrypt,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Encrypt => f.write_str("encrypt"),
            Mode::Decrypt => f.write_str("decrypt"),
        }
    }
}

/// Lifecycle of a single file conversion.
///
/// `Start → ModeDetected → HeaderHandled → KeyDerived → Streamed → Committed`,
/// or `Failed` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Start,
    ModeDetected,
    HeaderHandled,
    KeyDerived,
    Streamed,
    Committed,
    Failed,
}
