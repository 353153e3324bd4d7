//! Engine Configuration
//!
//! Loaded from a camelCase JSON file. Every field has a default, so an empty
//! object is a valid config.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Appearance of the error state drawn when a template fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SandboxConfig {
    pub error_background: String,
    pub error_foreground: String,
    pub error_title: String,
    pub title_font: String,
    pub message_font: String,
    pub line_offset: f64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            error_background: "#fee2e2".to_string(),
            error_foreground: "#dc2626".to_string(),
            error_title: "Template Error".to_string(),
            title_font: "14px sans-serif".to_string(),
            message_font: "12px sans-serif".to_string(),
            line_offset: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Directory of `*.json` template manifests registered at startup.
    pub templates_dir: Option<PathBuf>,
    /// Directory of `*.json` preset arrays registered after the built-ins.
    pub presets_dir: Option<PathBuf>,
    pub sandbox: SandboxConfig,
    /// Fill keys still undefined after flattening from reserved and template defaults.
    pub apply_defaults: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            templates_dir: None,
            presets_dir: None,
            sandbox: SandboxConfig::default(),
            apply_defaults: true,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_object_is_default() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(config.apply_defaults);
        assert_eq!(config.sandbox.error_background, "#fee2e2");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            concat!(
                r#"{{"templatesDir": "/tmp/t", "presetsDir": "/tmp/p", "#,
                r#""sandbox": {{"errorTitle": "Oops"}}}}"#
            )
        )
        .unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.templates_dir, Some(PathBuf::from("/tmp/t")));
        assert_eq!(config.presets_dir, Some(PathBuf::from("/tmp/p")));
        assert_eq!(config.sandbox.error_title, "Oops");
        assert_eq!(config.sandbox.line_offset, 20.0);
    }

    #[test]
    fn test_load_errors() {
        let missing = EngineConfig::load(Path::new("/definitely/not/here.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(EngineConfig::load(file.path()), Err(ConfigError::Parse { .. })));
    }
}
