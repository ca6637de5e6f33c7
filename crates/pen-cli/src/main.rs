//! pen: encrypt and decrypt files in place with a password
//!
//! Usage:
//!   pen [--config ~/.config/pen/config.toml] [--no-confirm] [--ignore-version] FILE...
//!
//! Files ending in `.pen` are decrypted; everything else is encrypted. One
//! password is read for the whole invocation. A failure on one file is
//! reported and the remaining files are still processed.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};

use pen_core::{
    obtain_password, ConvertOptions, Converter, PasswordSource, PenConfig, VersionPolicy,
};
use secrecy::SecretString;

const DEFAULT_CONFIG: &str = "~/.config/pen/config.toml";

#[derive(Parser, Debug)]
#[command(
    name = "pen",
    version,
    about = "Password-based file encryption",
    long_about = "pen: encrypt files to <name>.pen and decrypt <name>.pen back to <name>, in place"
)]
struct Cli {
    /// Files to encrypt or decrypt
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to config.toml
    #[arg(
        long,
        short = 'c',
        env = "PEN_CONFIG",
        default_value = DEFAULT_CONFIG
    )]
    config: PathBuf,

    /// Do not ask for the password a second time before encrypting
    #[arg(long)]
    no_confirm: bool,

    /// Read containers even if their format version is newer than this build
    #[arg(long)]
    ignore_version: bool,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "PEN_LOG")]
    log: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, env = "PEN_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

/// Reads from the controlling terminal with echo disabled.
struct TerminalPrompt;

impl PasswordSource for TerminalPrompt {
    fn read_password(&mut self, prompt: &str) -> std::io::Result<SecretString> {
        rpassword::prompt_password(prompt).map(SecretString::from)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = expand_tilde(&cli.config);
    let (mut config, found) = load_config(&config_path).await?;
    apply_overrides(&mut config, &cli);

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        files = cli.files.len(),
        "pen starting"
    );
    if !found && cli.config.as_path() != Path::new(DEFAULT_CONFIG) {
        warn!(
            "config file not found: {}  (using defaults)",
            config_path.display()
        );
    }

    let converter = Converter::new(ConvertOptions::from_config(&config));
    let jobs = converter.plan(&cli.files);

    let password = match obtain_password(&mut TerminalPrompt, &jobs, config.policy.confirm_password)
    {
        Ok(password) => password,
        Err(e) => {
            eprintln!("pen: fatal; {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut failed = 0usize;
    for result in converter.convert_all(&jobs, &password).await {
        if let Err(e) = result {
            eprintln!("pen: ({}) fatal; {}", e.path.display(), e.source);
            failed += 1;
        }
    }

    if failed > 0 {
        debug!(failed, total = jobs.len(), "some files failed");
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Load the config file, falling back to defaults when it does not exist.
/// The flag reports whether the file was found.
async fn load_config(path: &Path) -> Result<(PenConfig, bool)> {
    if !path.exists() {
        return Ok((PenConfig::default(), false));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config = PenConfig::from_toml(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    Ok((config, true))
}

fn apply_overrides(config: &mut PenConfig, cli: &Cli) {
    if cli.no_confirm {
        config.policy.confirm_password = false;
    }
    if cli.ignore_version {
        config.policy.version_check = VersionPolicy::Ignore;
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        path.to_path_buf()
    }
}

/// Logs go to stderr; stdout stays clean.
fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_files_required() {
        assert!(Cli::try_parse_from(["pen"]).is_err());
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "pen",
            "--no-confirm",
            "--ignore-version",
            "--log-format",
            "json",
            "a.txt",
            "b.txt.pen",
        ])
        .unwrap();

        assert_eq!(cli.files, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt.pen")]);
        assert!(cli.no_confirm);
        assert!(cli.ignore_version);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from(["pen", "--no-confirm", "--ignore-version", "x"]).unwrap();
        let mut config = PenConfig::default();
        apply_overrides(&mut config, &cli);

        assert!(!config.policy.confirm_password);
        assert_eq!(config.policy.version_check, VersionPolicy::Ignore);
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let cli = Cli::try_parse_from(["pen", "x"]).unwrap();
        let mut config = PenConfig::default();
        apply_overrides(&mut config, &cli);

        assert!(config.policy.confirm_password);
        assert_eq!(config.policy.version_check, VersionPolicy::Enforce);
    }

    #[test]
    fn test_expand_tilde() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(
            expand_tilde(Path::new("~/.config/pen/config.toml")),
            PathBuf::from(home).join(".config/pen/config.toml")
        );
        assert_eq!(expand_tilde(Path::new("/etc/pen.toml")), PathBuf::from("/etc/pen.toml"));
    }

    #[tokio::test]
    async fn test_load_config_missing_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (config, found) = load_config(&tmp.path().join("nope.toml")).await.unwrap();

        assert!(!found);
        assert_eq!(config.container.extension, "pen");
    }

    #[tokio::test]
    async fn test_load_config_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "[container]\nextension = \"box\"\n[policy]\nconfirm_password = false\n",
        )
        .unwrap();

        let (config, found) = load_config(&path).await.unwrap();
        assert!(found);
        assert_eq!(config.container.extension, "box");
        assert!(!config.policy.confirm_password);
    }

    #[tokio::test]
    async fn test_load_config_invalid() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[container]\nextension = \"a.b\"\n").unwrap();

        assert!(load_config(&path).await.is_err());
    }
}
