//! # Configuration
//!
//! TOML configuration, loaded from `coexnet.toml` unless `--config` says
//! otherwise. Every field has a default, and a missing file means defaults.
//!
//! ```toml
//! [backend]
//! url = "https://coexpression.example.org/api"
//! api_key = "..."
//!
//! [limits]
//! coex_max_genes = 20
//! viz_max_query_genes = 20
//! ```
//!
//! Environment overrides (secrets stay out of the file):
//! - `COEXNET_URL`: backend URL
//! - `COEXNET_API_KEY`: Bearer token

use coexnet_core::SelectionLimits;
use coexnet_core::primitives::{
    DEFAULT_COEX_MAX_GENES, DEFAULT_DIFF_EX_MAX_EXPERIMENTS, DEFAULT_DIFF_EX_MAX_GENES,
    DEFAULT_DIFF_EX_VIZ_MAX_EXPERIMENTS, DEFAULT_DIFF_EX_VIZ_MAX_GENES,
    DEFAULT_VIZ_MAX_QUERY_GENES,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name.
pub const DEFAULT_CONFIG_FILE: &str = "coexnet.toml";

/// Default backend URL.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";

/// Errors loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub backend: BackendConfig,
    pub limits: LimitConfig,
}

/// Where the coexpression service lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            api_key: None,
        }
    }
}

/// Selection caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitConfig {
    pub coex_max_genes: usize,
    pub diff_ex_max_genes: usize,
    pub diff_ex_max_experiments: usize,
    pub diff_ex_viz_max_genes: usize,
    pub diff_ex_viz_max_experiments: usize,
    /// Cap on query genes when searching from graph nodes.
    pub viz_max_query_genes: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            coex_max_genes: DEFAULT_COEX_MAX_GENES,
            diff_ex_max_genes: DEFAULT_DIFF_EX_MAX_GENES,
            diff_ex_max_experiments: DEFAULT_DIFF_EX_MAX_EXPERIMENTS,
            diff_ex_viz_max_genes: DEFAULT_DIFF_EX_VIZ_MAX_GENES,
            diff_ex_viz_max_experiments: DEFAULT_DIFF_EX_VIZ_MAX_EXPERIMENTS,
            viz_max_query_genes: DEFAULT_VIZ_MAX_QUERY_GENES,
        }
    }
}

impl LimitConfig {
    /// The caps the selection validator applies.
    #[must_use]
    pub fn selection_limits(&self) -> SelectionLimits {
        SelectionLimits {
            coex_max_genes: self.coex_max_genes,
            diff_ex_max_genes: self.diff_ex_max_genes,
            diff_ex_max_experiments: self.diff_ex_max_experiments,
            diff_ex_viz_max_genes: self.diff_ex_viz_max_genes,
            diff_ex_viz_max_experiments: self.diff_ex_viz_max_experiments,
        }
    }
}

impl Config {
    /// Load from `path` and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path` only. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply `COEXNET_URL` and `COEXNET_API_KEY` from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("COEXNET_URL").filter(|v| !v.trim().is_empty()) {
            self.backend.url = url;
        }
        if let Some(key) = lookup("COEXNET_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.backend.api_key = Some(key);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write");
        file
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = Config::from_file(&dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(config, Config::default());
        assert_eq!(config.limits.coex_max_genes, 20);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_config(
            r#"
            [backend]
            url = "https://example.org/api"

            [limits]
            viz_max_query_genes = 30
            "#,
        );
        let config = Config::from_file(file.path()).expect("load");
        assert_eq!(config.backend.url, "https://example.org/api");
        assert_eq!(config.backend.api_key, None);
        assert_eq!(config.limits.viz_max_query_genes, 30);
        assert_eq!(config.limits.diff_ex_viz_max_genes, 100);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let file = write_config("[backend\nurl = ");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config("[limits]\nmax_everything = 3\n");
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "COEXNET_URL" => Some("http://override:9000".into()),
            "COEXNET_API_KEY" => Some("token".into()),
            _ => None,
        });
        assert_eq!(config.backend.url, "http://override:9000");
        assert_eq!(config.backend.api_key.as_deref(), Some("token"));
    }

    #[test]
    fn blank_override_is_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some("  ".into()));
        assert_eq!(config.backend.url, DEFAULT_BACKEND_URL);
    }

    #[test]
    fn limits_map_to_selection_limits() {
        let limits = LimitConfig {
            coex_max_genes: 5,
            ..LimitConfig::default()
        };
        assert_eq!(limits.selection_limits().coex_max_genes, 5);
    }
}
