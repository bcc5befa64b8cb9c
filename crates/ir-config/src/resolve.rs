//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG paths →
//! system config → builtin defaults.

use std::path::{Path, PathBuf};

/// Discovered configuration file path.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path to estimator.json (or None if using builtin defaults).
    pub estimator: Option<PathBuf>,

    /// Source of the estimator config (for diagnostics).
    pub estimator_source: ConfigSource,
}

/// Where a configuration file was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/inspection-risk/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
const ENV_ESTIMATOR_PATH: &str = "INSPECTION_RISK_CONFIG";
const ENV_CONFIG_DIR: &str = "INSPECTION_RISK_CONFIG_DIR";

/// Standard config file name.
const ESTIMATOR_FILENAME: &str = "estimator.json";

/// Application name for XDG directories.
const APP_NAME: &str = "inspection-risk";

/// Resolve the estimator config path using the standard resolution order.
///
/// 1. Explicit CLI path (if provided)
/// 2. INSPECTION_RISK_CONFIG environment variable (direct file path)
/// 3. INSPECTION_RISK_CONFIG_DIR environment variable + filename
/// 4. XDG config directory (~/.config/inspection-risk/)
/// 5. System config (/etc/inspection-risk/)
/// 6. Built-in defaults (None)
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigPaths {
    let mut paths = ConfigPaths::default();

    if let Some(path) = cli_path {
        if path.exists() {
            paths.estimator_source = ConfigSource::CliArgument;
            paths.estimator = Some(path.to_path_buf());
            return paths;
        }
    }

    if let Ok(env_path) = std::env::var(ENV_ESTIMATOR_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            paths.estimator_source = ConfigSource::Environment;
            paths.estimator = Some(path);
            return paths;
        }
    }

    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(dir).join(ESTIMATOR_FILENAME);
        if path.exists() {
            paths.estimator_source = ConfigSource::Environment;
            paths.estimator = Some(path);
            return paths;
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join(APP_NAME).join(ESTIMATOR_FILENAME);
        if path.exists() {
            paths.estimator_source = ConfigSource::XdgConfig;
            paths.estimator = Some(path);
            return paths;
        }
    }

    let system = PathBuf::from("/etc").join(APP_NAME).join(ESTIMATOR_FILENAME);
    if system.exists() {
        paths.estimator_source = ConfigSource::SystemConfig;
        paths.estimator = Some(system);
        return paths;
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_cli_path_falls_through() {
        let paths = resolve_config(Some(Path::new("/definitely/not/here.json")));
        assert_ne!(paths.estimator_source, ConfigSource::CliArgument);
    }

    #[test]
    fn existing_cli_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("estimator.json");
        std::fs::write(&file, "{}").unwrap();

        let paths = resolve_config(Some(&file));
        assert_eq!(paths.estimator_source, ConfigSource::CliArgument);
        assert_eq!(paths.estimator.as_deref(), Some(file.as_path()));
    }

    #[test]
    fn config_source_displays() {
        assert_eq!(ConfigSource::BuiltinDefault.to_string(), "builtin default");
        assert_eq!(ConfigSource::XdgConfig.to_string(), "XDG config");
    }
}
