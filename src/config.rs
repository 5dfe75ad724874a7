//! Configuration for stagegate.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (STAGEGATE_HOME)
//! 2. Config file (.stagegate/config.yaml)
//! 3. Defaults (~/.stagegate)
//!
//! Config file discovery:
//! - Searches current directory and parents for .stagegate/config.yaml
//! - `paths.home` is relative to the .stagegate/ directory

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::matcher::DEFAULT_MIN_CONFIDENCE;
use crate::validator::FitMode;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const HOME_ENV: &str = "STAGEGATE_HOME";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub matcher: Option<MatcherConfig>,
    #[serde(default)]
    pub gate: Option<GateConfig>,
    #[serde(default)]
    pub collaborators: Option<CollaboratorsConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (relative to .stagegate/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatcherConfig {
    pub min_confidence: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    /// Run the generator as soon as validation passes
    pub auto_generate: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorsConfig {
    /// Preview command line; the artifact is piped to stdin
    pub render_command: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub fit_mode: Option<FitMode>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to stagegate home (engine state)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub settings: Settings,
}

/// Behavior settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub min_confidence: f64,
    pub auto_generate: bool,
    pub render_command: Option<String>,
    pub collaborator_timeout: Duration,
    pub fit_mode: FitMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            auto_generate: true,
            render_command: None,
            collaborator_timeout: Duration::from_secs(600),
            fit_mode: FitMode::Fit,
        }
    }
}

impl Settings {
    fn from_file(config: &ConfigFile) -> Self {
        let defaults = Self::default();
        let collaborators = config.collaborators.as_ref();

        Self {
            min_confidence: config
                .matcher
                .as_ref()
                .and_then(|m| m.min_confidence)
                .unwrap_or(defaults.min_confidence),
            auto_generate: config
                .gate
                .as_ref()
                .and_then(|g| g.auto_generate)
                .unwrap_or(defaults.auto_generate),
            render_command: collaborators.and_then(|c| c.render_command.clone()),
            collaborator_timeout: collaborators
                .and_then(|c| c.timeout_seconds)
                .map(Duration::from_secs)
                .unwrap_or(defaults.collaborator_timeout),
            fit_mode: collaborators
                .and_then(|c| c.fit_mode)
                .unwrap_or(defaults.fit_mode),
        }
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".stagegate").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine the sources into a resolved configuration
fn resolve(
    config_file: Option<(PathBuf, ConfigFile)>,
    env_home: Option<String>,
    default_home: PathBuf,
) -> ResolvedConfig {
    let Some((config_path, config)) = config_file else {
        return ResolvedConfig {
            home: env_home.map(PathBuf::from).unwrap_or(default_home),
            config_file: None,
            settings: Settings::default(),
        };
    };

    let home = if let Some(env_home) = env_home {
        PathBuf::from(env_home)
    } else if let Some(ref home_path) = config.paths.home {
        // home is relative to .stagegate/ directory
        let stagegate_dir = config_path.parent().unwrap_or(Path::new("."));
        resolve_path(stagegate_dir, home_path)
    } else {
        default_home
    };

    ResolvedConfig {
        home,
        settings: Settings::from_file(&config),
        config_file: Some(config_path),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    // Default home directory
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".stagegate");

    let config_file = match find_config_file() {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    Ok(resolve(
        config_file,
        std::env::var(HOME_ENV).ok(),
        default_home,
    ))
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

/// Get the stagegate home directory (engine state).
pub fn stagegate_home() -> Result<PathBuf> {
    Ok(config()?.home.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(temp: &TempDir, body: &str) -> PathBuf {
        let dir = temp.path().join(".stagegate");
        std::fs::create_dir_all(&dir).unwrap();
        let config_path = dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "{}", body).unwrap();
        config_path
    }

    #[test]
    fn test_defaults_without_file() {
        let config = resolve(None, None, PathBuf::from("/home/u/.stagegate"));

        assert_eq!(config.home, PathBuf::from("/home/u/.stagegate"));
        assert!(config.config_file.is_none());
        assert_eq!(config.settings, Settings::default());
        assert_eq!(config.settings.min_confidence, 0.6);
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            &temp,
            r#"
version: "1.0"
paths:
  home: ./state
matcher:
  min_confidence: 0.75
gate:
  auto_generate: false
collaborators:
  render_command: "aerender -comp Main"
  timeout_seconds: 30
  fit_mode: fill
"#,
        );

        let file = load_config_file(&config_path).unwrap();
        let config = resolve(Some((config_path.clone(), file)), None, PathBuf::from("/unused"));

        assert_eq!(config.home, config_path.parent().unwrap().join("state"));
        assert_eq!(config.settings.min_confidence, 0.75);
        assert!(!config.settings.auto_generate);
        assert_eq!(
            config.settings.render_command.as_deref(),
            Some("aerender -comp Main")
        );
        assert_eq!(config.settings.collaborator_timeout, Duration::from_secs(30));
        assert_eq!(config.settings.fit_mode, FitMode::Fill);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(&temp, "paths:\n  home: ./state\n");

        let file = load_config_file(&config_path).unwrap();
        let config = resolve(
            Some((config_path, file)),
            Some("/srv/stagegate".to_string()),
            PathBuf::from("/unused"),
        );
        assert_eq!(config.home, PathBuf::from("/srv/stagegate"));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
