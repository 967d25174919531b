use crate::error::{DuskError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Daemon startup settings, loadable from a TOML or JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Lock file recording the daemon pid and enforcing single-instance
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// File receiving stdout/stderr after detaching; /dev/null when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Working directory for the detached process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// File-mode creation mask as an octal string, e.g. "027"
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_umask",
        serialize_with = "serialize_umask"
    )]
    pub umask: Option<u32>,
}

// Default value functions for serde
fn default_pid_file() -> PathBuf {
    PathBuf::from("/tmp/duskd.pid")
}

/// Umask fields are written as octal strings ("027", "0o027") since a bare
/// TOML/JSON integer would be read as decimal.
fn deserialize_umask<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => {
            let digits = s.trim().trim_start_matches("0o");
            u32::from_str_radix(digits, 8).map(Some).map_err(|_| {
                serde::de::Error::custom(format!(
                    "Invalid umask {:?}: expected octal digits",
                    s
                ))
            })
        }
    }
}

fn serialize_umask<S>(value: &Option<u32>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        None => serializer.serialize_none(),
        Some(bits) => serializer.serialize_some(&format!("{:03o}", bits)),
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            pid_file: default_pid_file(),
            log_file: None,
            working_dir: None,
            umask: None,
        }
    }
}

impl DaemonConfig {
    /// Load the configuration from a file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<DaemonConfig> {
        // Read file contents
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DuskError::Config(format!("Failed to read config file: {}", e)))?;

        // Determine format based on file extension
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let config: DaemonConfig = match extension {
            "toml" => toml::from_str(&contents)
                .map_err(|e| DuskError::InvalidConfig(format!("Failed to parse TOML: {}", e)))?,
            "json" => serde_json::from_str(&contents)
                .map_err(|e| DuskError::InvalidConfig(format!("Failed to parse JSON: {}", e)))?,
            _ => {
                return Err(DuskError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate pid file path
        if self.pid_file.as_os_str().is_empty() {
            return Err(DuskError::InvalidConfig(
                "pid_file must not be empty".to_string(),
            ));
        }

        // Validate umask range
        if let Some(mask) = self.umask {
            if mask > 0o777 {
                return Err(DuskError::InvalidConfig(format!(
                    "umask {:o} out of range (maximum 777)",
                    mask
                )));
            }
        }

        // Validate working directory exists if specified
        if let Some(ref dir) = self.working_dir {
            if !dir.is_dir() {
                return Err(DuskError::InvalidConfig(format!(
                    "Working directory is not a directory: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_daemon_config_defaults() {
        let config = DaemonConfig::default();

        assert_eq!(config.pid_file, PathBuf::from("/tmp/duskd.pid"));
        assert_eq!(config.log_file, None);
        assert_eq!(config.working_dir, None);
        assert_eq!(config.umask, None);
    }

    #[test]
    fn test_empty_toml_falls_back_to_defaults() {
        let config: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(config.pid_file, PathBuf::from("/tmp/duskd.pid"));
        assert_eq!(config.umask, None);
    }

    #[test]
    fn test_parse_toml() {
        let toml_content = r#"
            pid_file = "/var/run/duskd.pid"
            log_file = "/var/log/duskd.log"
            working_dir = "/"
            umask = "027"
        "#;

        let config: DaemonConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.pid_file, PathBuf::from("/var/run/duskd.pid"));
        assert_eq!(config.log_file, Some(PathBuf::from("/var/log/duskd.log")));
        assert_eq!(config.working_dir, Some(PathBuf::from("/")));
        assert_eq!(config.umask, Some(0o027));
    }

    #[test]
    fn test_parse_json() {
        let json_content = r#"
            {
                "pid_file": "/var/run/duskd.pid",
                "umask": "0o022"
            }
        "#;

        let config: DaemonConfig = serde_json::from_str(json_content).unwrap();
        assert_eq!(config.pid_file, PathBuf::from("/var/run/duskd.pid"));
        assert_eq!(config.umask, Some(0o022));
    }

    #[test]
    fn test_parse_rejects_non_octal_umask() {
        let toml_content = r#"umask = "09""#;
        assert!(toml::from_str::<DaemonConfig>(toml_content).is_err());
    }

    #[test]
    fn test_umask_roundtrips_as_octal_string() {
        let config = DaemonConfig {
            umask: Some(0o027),
            ..DaemonConfig::default()
        };

        let rendered = toml::to_string(&config).unwrap();
        assert!(rendered.contains(r#"umask = "027""#));

        let parsed: DaemonConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.umask, Some(0o027));
    }

    #[test]
    fn test_validate_empty_pid_file() {
        let config = DaemonConfig {
            pid_file: PathBuf::new(),
            ..DaemonConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(DuskError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_umask_out_of_range() {
        let config = DaemonConfig {
            umask: Some(0o7777),
            ..DaemonConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(DuskError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_missing_working_dir() {
        let config = DaemonConfig {
            working_dir: Some(PathBuf::from("/definitely/not/a/real/dir")),
            ..DaemonConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(DuskError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_file_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("duskd.toml");

        let toml_content = r#"
            pid_file = "/tmp/test-duskd.pid"
            umask = "022"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = DaemonConfig::from_file(&config_path).unwrap();
        assert_eq!(config.pid_file, PathBuf::from("/tmp/test-duskd.pid"));
        assert_eq!(config.umask, Some(0o022));
    }

    #[test]
    fn test_from_file_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("duskd.json");

        let json_content = r#"
            {
                "pid_file": "/tmp/test-duskd.pid",
                "log_file": "/tmp/test-duskd.log"
            }
        "#;

        fs::write(&config_path, json_content).unwrap();

        let config = DaemonConfig::from_file(&config_path).unwrap();
        assert_eq!(config.pid_file, PathBuf::from("/tmp/test-duskd.pid"));
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/test-duskd.log")));
    }

    #[test]
    fn test_from_file_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("duskd.yaml");

        fs::write(&config_path, "pid_file: /tmp/x.pid").unwrap();

        let result = DaemonConfig::from_file(&config_path);
        assert!(matches!(result, Err(DuskError::InvalidConfig(_))));
    }
}
