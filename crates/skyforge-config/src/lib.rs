//! Engine settings
//!
//! Settings are read from a YAML file; every field is optional and falls back
//! to the engine defaults.
//!
//! ```yaml
//! cluster_name: dev.example.com
//! target: terraform
//! read_backoff:
//!   initial_ms: 500
//!   steps: 20
//! write_backoff:
//!   cap_ms: 30000
//! ```

pub mod error;

pub use error::*;

use serde::Deserialize;
use skyforge_core::{Backoff, TargetKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the settings file directly
pub const CONFIG_ENV: &str = "SKYFORGE_CONFIG";

const CANDIDATES: [&str; 4] = [
    "skyforge.local.yaml",
    ".skyforge.local.yaml",
    "skyforge.yaml",
    ".skyforge.yaml",
];

/// Resolved engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub cluster_name: Option<String>,
    pub target: TargetKind,
    pub read_backoff: Backoff,
    pub write_backoff: Backoff,

    /// File the settings were read from
    pub source: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cluster_name: None,
            target: TargetKind::DirectApply,
            read_backoff: Backoff::read(),
            write_backoff: Backoff::write(),
            source: None,
        }
    }
}

/// On-disk shape of the settings file
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    cluster_name: Option<String>,
    target: Option<String>,
    #[serde(default)]
    read_backoff: BackoffSettings,
    #[serde(default)]
    write_backoff: BackoffSettings,
}

/// Overrides for one backoff policy
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackoffSettings {
    pub initial_ms: Option<u64>,
    pub factor: Option<f64>,
    pub jitter: Option<f64>,
    pub steps: Option<u32>,
    pub cap_ms: Option<u64>,
}

impl BackoffSettings {
    /// Apply the overrides on top of `base`
    pub fn apply(&self, field: &str, base: Backoff) -> Result<Backoff> {
        let backoff = Backoff {
            initial: self.initial_ms.map(Duration::from_millis).unwrap_or(base.initial),
            factor: self.factor.unwrap_or(base.factor),
            jitter: self.jitter.unwrap_or(base.jitter),
            steps: self.steps.unwrap_or(base.steps),
            cap: self.cap_ms.map(Duration::from_millis).or(base.cap),
        };

        if backoff.factor < 1.0 {
            return Err(invalid(format!("{field}.factor"), "must be at least 1.0"));
        }
        if !(0.0..=1.0).contains(&backoff.jitter) {
            return Err(invalid(format!("{field}.jitter"), "must be between 0.0 and 1.0"));
        }
        if backoff.steps == 0 {
            return Err(invalid(format!("{field}.steps"), "must be at least 1"));
        }
        Ok(backoff)
    }
}

fn invalid(field: String, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Directory holding the global settings file
pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("skyforge"))
        .ok_or(ConfigError::ConfigDirNotFound)
}

/// Locate the settings file
///
/// Lookup order:
/// 1. `SKYFORGE_CONFIG` (direct path; must exist)
/// 2. current directory: skyforge.local.yaml, .skyforge.local.yaml, skyforge.yaml, .skyforge.yaml
/// 3. `./.skyforge/`, same order
/// 4. `<config_dir>/skyforge/skyforge.yaml`
///
/// Returns `None` when no file exists, which means defaults apply.
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::ConfigFileMissing(path));
        }
        return Ok(Some(path));
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = first_existing(&current_dir) {
        return Ok(Some(path));
    }

    let local_dir = current_dir.join(".skyforge");
    if local_dir.is_dir() {
        if let Some(path) = first_existing(&local_dir) {
            return Ok(Some(path));
        }
    }

    if let Ok(config_dir) = get_config_dir() {
        let global = config_dir.join("skyforge.yaml");
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Load settings from the first file found, or defaults
pub fn load() -> Result<EngineConfig> {
    match find_config_file()? {
        Some(path) => load_from(&path),
        None => Ok(EngineConfig::default()),
    }
}

/// Load settings from `path`
pub fn load_from(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse(&content).map_err(|e| match e {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    config.source = Some(path.to_path_buf());
    Ok(config)
}

/// Parse settings from YAML text
pub fn parse(content: &str) -> Result<EngineConfig> {
    let file: ConfigFile = if content.trim().is_empty() {
        ConfigFile::default()
    } else {
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?
    };

    let target = match file.target.as_deref() {
        Some(name) => name
            .parse::<TargetKind>()
            .map_err(|reason| invalid("target".to_string(), &reason))?,
        None => TargetKind::DirectApply,
    };

    Ok(EngineConfig {
        cluster_name: file.cluster_name,
        target,
        read_backoff: file.read_backoff.apply("read_backoff", Backoff::read())?,
        write_backoff: file.write_backoff.apply("write_backoff", Backoff::write())?,
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_parse_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.write_backoff.steps, 5);
        assert_eq!(config.read_backoff.steps, 10);
    }

    #[test]
    fn test_parse_overrides() {
        let config = parse(
            r#"
cluster_name: dev.example.com
target: cloudformation
read_backoff:
  initial_ms: 250
  steps: 3
write_backoff:
  cap_ms: 30000
"#,
        )
        .unwrap();

        assert_eq!(config.cluster_name.as_deref(), Some("dev.example.com"));
        assert_eq!(config.target, TargetKind::CloudFormationEmit);
        assert_eq!(config.read_backoff.initial, Duration::from_millis(250));
        assert_eq!(config.read_backoff.steps, 3);
        assert_eq!(config.read_backoff.factor, 1.5);
        assert_eq!(config.write_backoff.steps, 5);
        assert_eq!(config.write_backoff.cap, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_settings() {
        assert!(matches!(
            parse("target: pulumi"),
            Err(ConfigError::Invalid { ref field, .. }) if field == "target"
        ));
        assert!(matches!(
            parse("write_backoff:\n  factor: 0.5"),
            Err(ConfigError::Invalid { ref field, .. }) if field == "write_backoff.factor"
        ));
        assert!(matches!(
            parse("read_backoff:\n  steps: 0"),
            Err(ConfigError::Invalid { ref field, .. }) if field == "read_backoff.steps"
        ));
        assert!(matches!(parse("unknown: 1"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("skyforge.yaml"), "target: terraform").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let found = find_config_file().unwrap().unwrap();
        assert!(found.ends_with("skyforge.yaml"));

        let config = load().unwrap();
        assert_eq!(config.target, TargetKind::TerraformEmit);
        assert!(config.source.is_some());

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_local_file_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("skyforge.yaml"), "").unwrap();
        fs::write(temp_dir.path().join(".skyforge.local.yaml"), "").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let found = find_config_file().unwrap().unwrap();
        assert!(found.ends_with(".skyforge.local.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_skyforge_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let local_dir = temp_dir.path().join(".skyforge");
        fs::create_dir(&local_dir).unwrap();
        fs::write(local_dir.join("skyforge.yaml"), "cluster_name: a").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let found = find_config_file().unwrap().unwrap();
        assert!(found.ends_with(".skyforge/skyforge.yaml"));

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_env_var_takes_precedence() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "cluster_name: from-env").unwrap();

        unsafe {
            std::env::set_var(CONFIG_ENV, config_path.to_str().unwrap());
        }

        let result = find_config_file();
        let config = load();

        unsafe {
            std::env::remove_var(CONFIG_ENV);
        }

        assert_eq!(result.unwrap(), Some(config_path));
        assert_eq!(config.unwrap().cluster_name.as_deref(), Some("from-env"));
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("missing.yaml");

        unsafe {
            std::env::set_var(CONFIG_ENV, &missing);
        }
        let result = find_config_file();
        unsafe {
            std::env::remove_var(CONFIG_ENV);
        }

        assert!(matches!(result, Err(ConfigError::ConfigFileMissing(path)) if path == missing));
    }

    #[test]
    #[serial]
    fn test_parse_error_names_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("skyforge.yaml");
        fs::write(&path, "cluster_name: [unclosed").unwrap();

        match load_from(&path) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }
}
