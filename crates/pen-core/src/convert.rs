//! Conversion orchestrator: one input file in, its counterpart out, the
//! original removed only after the output is complete.
//!
//! Per job:
//! ```text
//! Start ─▶ ModeDetected ─▶ HeaderHandled ─▶ KeyDerived ─▶ Streamed ─▶ Committed
//!                 └──────────────┴──────────────┴────────────┴──────▶ Failed
//! ```
//!
//! Encrypt: fresh salt → create output → write header → derive key → seal.
//! Decrypt: read + validate header → derive key → create output → open.
//! Both end in the same commit: flush, fsync, check the output length, and
//! only then delete the input. Any failure after the output exists removes
//! it and leaves the input alone.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pen_crypto::{
    derive_key, fresh_salt, ChunkCipher, EntropySource, KdfParams, Key, OsEntropy, SALT_SIZE,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::{PenConfig, VersionPolicy};
use crate::container::{Framing, Header, HEADER_LEN};
use crate::error::{FileError, PenError, PenResult};
use crate::pipeline::{self, PipelineStats};
use crate::types::{JobState, Mode};

/// Everything a [`Converter`] needs besides the password.
#[derive(Clone)]
pub struct ConvertOptions {
    /// Reserved extension, without the dot
    pub extension: String,
    pub version_policy: VersionPolicy,
    /// Argon2id parameters; keep the default for real files
    pub kdf: KdfParams,
    /// Plaintext chunk geometry; keep the default for real files
    pub framing: Framing,
    pub entropy: Arc<dyn EntropySource>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::from_config(&PenConfig::default())
    }
}

impl ConvertOptions {
    pub fn from_config(config: &PenConfig) -> Self {
        Self {
            extension: config.container.extension.clone(),
            version_policy: config.policy.version_check,
            kdf: KdfParams::default(),
            framing: Framing::default(),
            entropy: Arc::new(OsEntropy),
        }
    }
}

impl std::fmt::Debug for ConvertOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertOptions")
            .field("extension", &self.extension)
            .field("version_policy", &self.version_policy)
            .field("kdf", &self.kdf)
            .field("framing", &self.framing)
            .finish_non_exhaustive()
    }
}

/// One input file and what to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
    pub mode: Mode,
}

impl Job {
    /// Decide the mode from the file name alone.
    ///
    /// `name.<ext>` decrypts to `name`; anything else encrypts to
    /// `name.<ext>`. A bare `.<ext>` file has no stem and is encrypted.
    pub fn detect(input: &Path, extension: &str) -> Self {
        let is_container = input.extension().is_some_and(|e| e == extension)
            && input.file_stem().is_some_and(|s| !s.is_empty());

        if is_container {
            Self {
                input: input.to_path_buf(),
                output: input.with_extension(""),
                mode: Mode::Decrypt,
            }
        } else {
            let mut name = OsString::from(input.as_os_str());
            name.push(".");
            name.push(extension);
            Self {
                input: input.to_path_buf(),
                output: PathBuf::from(name),
                mode: Mode::Encrypt,
            }
        }
    }

    /// Whether this job writes a container header.
    pub fn writes_header(&self) -> bool {
        self.mode == Mode::Encrypt
    }

    fn enter(&self, state: JobState) {
        debug!(file = %self.input.display(), ?state, "job state");
    }
}

/// Result of a committed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub job: Job,
    pub stats: PipelineStats,
}

/// Processes jobs one at a time with a shared set of options.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConvertOptions,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Build one job per input path.
    pub fn plan<P: AsRef<Path>>(&self, inputs: &[P]) -> Vec<Job> {
        inputs
            .iter()
            .map(|p| Job::detect(p.as_ref(), &self.options.extension))
            .collect()
    }

    /// Run every job in order. A failure is recorded and the next job still
    /// runs.
    pub async fn convert_all(
        &self,
        jobs: &[Job],
        password: &SecretString,
    ) -> Vec<Result<Outcome, FileError>> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            let result = self
                .convert(job, password)
                .await
                .map_err(|e| FileError::new(&job.input, e));
            results.push(result);
        }
        results
    }

    /// Convert a single file in place.
    pub async fn convert(&self, job: &Job, password: &SecretString) -> PenResult<Outcome> {
        job.enter(JobState::Start);
        job.enter(JobState::ModeDetected);

        let result = match job.mode {
            Mode::Encrypt => self.encrypt(job, password).await,
            Mode::Decrypt => self.decrypt(job, password).await,
        };

        match result {
            Ok(stats) => {
                job.enter(JobState::Committed);
                info!(
                    mode = %job.mode,
                    input = %job.input.display(),
                    output = %job.output.display(),
                    chunks = stats.chunks,
                    "converted"
                );
                Ok(Outcome {
                    job: job.clone(),
                    stats,
                })
            }
            Err(e) => {
                job.enter(JobState::Failed);
                Err(e)
            }
        }
    }

    async fn encrypt(&self, job: &Job, password: &SecretString) -> PenResult<PipelineStats> {
        let input = File::open(&job.input).await?;
        let salt = fresh_salt(self.options.entropy.as_ref())?;
        let header = Header::new(salt);

        let mut output = PartialOutput::create(&job.output).await?;
        header.write_to(output.file()).await?;
        job.enter(JobState::HeaderHandled);

        let cipher = self.cipher(password, salt).await?;
        job.enter(JobState::KeyDerived);

        let stats = pipeline::run(
            input,
            output.file(),
            cipher,
            Mode::Encrypt,
            self.options.framing,
        )
        .await?;
        job.enter(JobState::Streamed);

        let body = self.options.framing.sealed_len(stats.bytes_in);
        if stats.bytes_out != body {
            return Err(PenError::Pipeline(format!(
                "sealed {} bytes, expected {body}",
                stats.bytes_out
            )));
        }
        output.commit(&job.input, HEADER_LEN as u64 + body).await?;
        Ok(stats)
    }

    async fn decrypt(&self, job: &Job, password: &SecretString) -> PenResult<PipelineStats> {
        let mut input = File::open(&job.input).await?;
        let header = Header::read_from(&mut input, self.options.version_policy).await?;
        job.enter(JobState::HeaderHandled);

        let cipher = self.cipher(password, header.salt).await?;
        job.enter(JobState::KeyDerived);

        let mut output = PartialOutput::create(&job.output).await?;
        let stats = pipeline::run(
            input,
            output.file(),
            cipher,
            Mode::Decrypt,
            self.options.framing,
        )
        .await?;
        job.enter(JobState::Streamed);

        output.commit(&job.input, stats.bytes_out).await?;
        Ok(stats)
    }

    /// Derive the file key on the blocking pool and bind it to a chunk cipher.
    async fn cipher(
        &self,
        password: &SecretString,
        salt: [u8; SALT_SIZE],
    ) -> PenResult<ChunkCipher> {
        let password = SecretString::from(password.expose_secret());
        let params = self.options.kdf.clone();

        let key: Key = tokio::task::spawn_blocking(move || derive_key(&password, &salt, &params))
            .await
            .map_err(|e| PenError::Kdf(format!("key derivation task failed: {e}")))??;

        Ok(ChunkCipher::new(&key, Arc::clone(&self.options.entropy)))
    }
}

/// An output file that is deleted unless [`PartialOutput::commit`] succeeds.
struct PartialOutput {
    path: PathBuf,
    file: File,
    committed: bool,
}

impl PartialOutput {
    /// Create the output, refusing to overwrite an existing file.
    async fn create(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        debug!(path = %path.display(), "output created");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            committed: false,
        })
    }

    fn file(&mut self) -> &mut File {
        &mut self.file
    }

    /// Flush, fsync, verify the length, then remove `source`.
    async fn commit(mut self, source: &Path, expected_len: u64) -> PenResult<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;

        let actual = self.file.metadata().await?.len();
        if actual != expected_len {
            return Err(PenError::Pipeline(format!(
                "output is {actual} bytes, expected {expected_len}"
            )));
        }

        fs::remove_file(source).await?;
        self.committed = true;
        debug!(
            output = %self.path.display(),
            removed = %source.display(),
            "output committed"
        );
        Ok(())
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "partial output removed"),
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "could not remove partial output"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_encrypt() {
        let job = Job::detect(Path::new("dir/report.txt"), "pen");

        assert_eq!(job.mode, Mode::Encrypt);
        assert_eq!(job.output, PathBuf::from("dir/report.txt.pen"));
        assert!(job.writes_header());
    }

    #[test]
    fn test_detect_decrypt() {
        let job = Job::detect(Path::new("dir/report.txt.pen"), "pen");

        assert_eq!(job.mode, Mode::Decrypt);
        assert_eq!(job.output, PathBuf::from("dir/report.txt"));
        assert!(!job.writes_header());
    }

    #[test]
    fn test_detect_no_extension() {
        let job = Job::detect(Path::new("Makefile"), "pen");
        assert_eq!(job.mode, Mode::Encrypt);
        assert_eq!(job.output, PathBuf::from("Makefile.pen"));

        let job = Job::detect(Path::new("archive.pen"), "pen");
        assert_eq!(job.mode, Mode::Decrypt);
        assert_eq!(job.output, PathBuf::from("archive"));
    }

    #[test]
    fn test_detect_hidden_and_lookalikes() {
        // No stem: treated as a plain file
        let job = Job::detect(Path::new(".pen"), "pen");
        assert_eq!(job.mode, Mode::Encrypt);
        assert_eq!(job.output, PathBuf::from(".pen.pen"));

        // Extension must match exactly
        let job = Job::detect(Path::new("notes.penx"), "pen");
        assert_eq!(job.mode, Mode::Encrypt);
        let job = Job::detect(Path::new("notes.PEN"), "pen");
        assert_eq!(job.mode, Mode::Encrypt);
    }

    #[test]
    fn test_detect_custom_extension() {
        let job = Job::detect(Path::new("a.box"), "box");
        assert_eq!(job.mode, Mode::Decrypt);

        let job = Job::detect(Path::new("a.pen"), "box");
        assert_eq!(job.mode, Mode::Encrypt);
        assert_eq!(job.output, PathBuf::from("a.pen.box"));
    }

    #[tokio::test]
    async fn test_commit_missing_source_removes_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("out.pen");
        let missing = tmp.path().join("gone.txt");

        let mut output = PartialOutput::create(&out).await.unwrap();
        output.file().write_all(b"abc").await.unwrap();
        let err = output.commit(&missing, 3).await.unwrap_err();

        match err {
            PenError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_commit_length_mismatch_keeps_source() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("out.pen");
        let source = tmp.path().join("in.txt");
        std::fs::write(&source, b"original").unwrap();

        let mut output = PartialOutput::create(&out).await.unwrap();
        output.file().write_all(b"abc").await.unwrap();
        let err = output.commit(&source, 4).await.unwrap_err();

        assert!(matches!(err, PenError::Pipeline(_)), "got {err:?}");
        assert!(!out.exists());
        assert_eq!(std::fs::read(&source).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_uncommitted_output_removed_on_drop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("out.pen");

        let output = PartialOutput::create(&out).await.unwrap();
        assert!(out.exists());
        drop(output);

        assert!(!out.exists());
    }

    #[test]
    fn test_plan_keeps_order() {
        let converter = Converter::default();
        let jobs = converter.plan(&["a.txt", "b.txt.pen", "c"]);

        let modes: Vec<Mode> = jobs.iter().map(|j| j.mode).collect();
        assert_eq!(modes, vec![Mode::Encrypt, Mode::Decrypt, Mode::Encrypt]);
    }
}
