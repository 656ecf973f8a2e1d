//! Validator configuration.
//!
//! Read from an optional JSON file (`hacheck.json` in the configuration
//! directory by default). Every field has a default, so an absent file is a
//! complete configuration for a standard controller layout.

use std::path::{Path, PathBuf};

use hacheck_registry::SnapshotSource;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::validate::semantic::SemanticConfig;

/// File name looked up in the configuration directory when no explicit
/// configuration file is given.
pub const DEFAULT_CONFIG_FILE: &str = "hacheck.json";

/// Errors loading or checking a [`ValidatorConfig`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {}: {source}", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON of the expected shape.
    #[error("invalid configuration {}: {source}", path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The JSON error, including unknown keys.
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Paths of the registry snapshot files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryPaths {
    /// Entity registry; required.
    pub entities: PathBuf,
    /// Device registry; skipped when absent.
    pub devices: Option<PathBuf>,
    /// Area registry; skipped when absent.
    pub areas: Option<PathBuf>,
}

impl Default for RegistryPaths {
    fn default() -> Self {
        Self {
            entities: PathBuf::from(".storage/core.entity_registry"),
            devices: Some(PathBuf::from(".storage/core.device_registry")),
            areas: Some(PathBuf::from(".storage/core.area_registry")),
        }
    }
}

/// Everything a validation run needs besides the scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Configuration directory. Not read from the file: it is where the
    /// file is looked up.
    #[serde(skip)]
    pub config_dir: PathBuf,
    /// Entry file, relative to the configuration directory.
    pub entry: PathBuf,
    /// Registry snapshot files.
    pub registry: RegistryPaths,
    /// Identifiers every controller provides without a registry record.
    pub builtin_entities: Vec<String>,
    /// Secrets file; never scanned for references.
    pub secrets_file: PathBuf,
    /// Stage 3 collaborator.
    pub semantic: SemanticConfig,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("."),
            entry: PathBuf::from("configuration.yaml"),
            registry: RegistryPaths::default(),
            builtin_entities: vec!["sun.sun".to_string(), "zone.home".to_string()],
            secrets_file: PathBuf::from("secrets.yaml"),
            semantic: SemanticConfig::default(),
        }
    }
}

impl ValidatorConfig {
    /// Defaults for `config_dir`.
    pub fn for_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            ..Self::default()
        }
    }

    /// Load the configuration for `config_dir`.
    ///
    /// `explicit` must exist when given. Otherwise `hacheck.json` in the
    /// directory is used if present, and defaults if not.
    pub fn load(config_dir: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let candidate = config_dir.join(DEFAULT_CONFIG_FILE);
                if !candidate.is_file() {
                    debug!(dir = %config_dir.display(), "no configuration file; using defaults");
                    return Ok(Self::for_dir(config_dir));
                }
                candidate
            }
        };
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        config.config_dir = config_dir.to_path_buf();
        config.validate()?;
        debug!(file = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.semantic.timeout_secs == 0 {
            return Err(ConfigError::Invalid("semantic.timeout_secs must be at least 1".into()));
        }
        if self.entry.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("entry must not be empty".into()));
        }
        Ok(())
    }

    /// `path` resolved against the configuration directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// The entry file as an absolute-or-directory-relative path.
    pub fn entry_path(&self) -> PathBuf {
        self.resolve(&self.entry)
    }

    /// Snapshot sources in load order: entities (required), then devices
    /// and areas when configured.
    pub fn snapshot_sources(&self) -> Vec<SnapshotSource> {
        let mut sources = vec![SnapshotSource::required(self.resolve(&self.registry.entities))];
        sources.extend(
            [&self.registry.devices, &self.registry.areas]
                .into_iter()
                .flatten()
                .map(|p| SnapshotSource::optional(self.resolve(p))),
        );
        sources
    }
}
