use serde::{Deserialize, Serialize};

use crate::error::{PenError, PenResult};

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PenConfig {
    pub container: ContainerConfig,
    pub policy: PolicyConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Reserved file extension, without the dot (default: pen)
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Ask for the password twice before encrypting anything (default: true)
    pub confirm_password: bool,
    /// How to treat the container's format version (default: enforce)
    pub version_check: VersionPolicy,
}

/// Whether a reader refuses containers written by a newer format version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionPolicy {
    /// Reject versions this build does not know
    #[default]
    Enforce,
    /// Read the version field but do not check it
    Ignore,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            extension: "pen".into(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            confirm_password: true,
            version_check: VersionPolicy::Enforce,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl PenConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml(content: &str) -> PenResult<Self> {
        let config: PenConfig =
            toml::from_str(content).map_err(|e| PenError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PenResult<()> {
        let ext = &self.container.extension;
        if ext.is_empty() {
            return Err(PenError::Config("container.extension must not be empty".into()));
        }
        if ext.contains(['.', '/', '\\']) {
            return Err(PenError::Config(format!(
                "container.extension must be a bare extension without dots or separators, got {ext:?}"
            )));
        }
        match self.log.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(PenError::Config(format!(
                "log.format must be \"json\" or \"text\", got {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[container]
extension = "box"

[policy]
confirm_password = false
version_check = "ignore"

[log]
level = "debug"
format = "json"
"#;
        let config = PenConfig::from_toml(toml_str).unwrap();

        assert_eq!(config.container.extension, "box");
        assert!(!config.policy.confirm_password);
        assert_eq!(config.policy.version_check, VersionPolicy::Ignore);
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config = PenConfig::from_toml("").unwrap();

        assert_eq!(config.container.extension, "pen");
        assert!(config.policy.confirm_password);
        assert_eq!(config.policy.version_check, VersionPolicy::Enforce);
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.log.format, "text");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[policy]
confirm_password = false
"#;
        let config = PenConfig::from_toml(toml_str).unwrap();

        // Overridden
        assert!(!config.policy.confirm_password);
        // Defaults
        assert_eq!(config.policy.version_check, VersionPolicy::Enforce);
        assert_eq!(config.container.extension, "pen");
    }

    #[test]
    fn test_rejects_bad_extension() {
        for ext in ["", "tar.pen", "a/b"] {
            let toml_str = format!("[container]\nextension = {ext:?}\n");
            let err = PenConfig::from_toml(&toml_str).unwrap_err();
            assert!(matches!(err, PenError::Config(_)), "accepted {ext:?}");
        }
    }

    #[test]
    fn test_rejects_unknown_version_policy() {
        let err = PenConfig::from_toml("[policy]\nversion_check = \"sometimes\"\n").unwrap_err();
        assert!(matches!(err, PenError::Config(_)));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = PenConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = PenConfig::from_toml(&toml_str).unwrap();

        assert_eq!(config.container.extension, parsed.container.extension);
        assert_eq!(config.policy.version_check, parsed.policy.version_check);
        assert_eq!(config.log.level, parsed.log.level);
    }
}
