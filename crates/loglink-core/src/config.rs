//! Settings and configuration file parsing for loglink
//!
//! Settings are layered: built-in defaults, then an optional config file,
//! then command-line flags and environment variables. Config files may be:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Fully resolved daemon settings, passed to every component at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub debug: bool,
    pub metadata_address: String,
    pub health_check_port: u16,
    pub docker_graph_dir: PathBuf,
    pub logging_containers_dir: PathBuf,
    pub logging_volumes_dir: PathBuf,
    pub logging_volumes_pattern: String,
    pub logging_files_pattern: String,
    pub poll_interval_ms: u64,
    pub resync_interval_secs: u64,
    pub poll_timeout_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub pending_retry_ms: u64,
    pub apply_concurrency: usize,
    pub root_failure_threshold: u32,
    pub watch_roots: bool,
    pub watch_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            metadata_address: DEFAULT_METADATA_ADDRESS.to_string(),
            health_check_port: DEFAULT_HEALTH_CHECK_PORT,
            docker_graph_dir: PathBuf::from(DEFAULT_DOCKER_GRAPH_DIR),
            logging_containers_dir: PathBuf::from(DEFAULT_LOGGING_CONTAINERS_DIR),
            logging_volumes_dir: PathBuf::from(DEFAULT_LOGGING_VOLUMES_DIR),
            logging_volumes_pattern: DEFAULT_LOGGING_VOLUMES_PATTERN.to_string(),
            logging_files_pattern: DEFAULT_LOGGING_FILES_PATTERN.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            backoff_initial_ms: DEFAULT_BACKOFF_INITIAL_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            pending_retry_ms: DEFAULT_PENDING_RETRY_MS,
            apply_concurrency: DEFAULT_APPLY_CONCURRENCY,
            root_failure_threshold: DEFAULT_ROOT_FAILURE_THRESHOLD,
            watch_roots: true,
            watch_debounce_ms: DEFAULT_WATCH_DEBOUNCE_MS,
        }
    }
}

impl Settings {
    /// Check the settings before any component is built from them
    pub fn validate(&self) -> Result<()> {
        for (flag, dir) in [
            ("logging-containers-dir", &self.logging_containers_dir),
            ("logging-volumes-dir", &self.logging_volumes_dir),
            ("docker-graph-dir", &self.docker_graph_dir),
        ] {
            if !dir.is_absolute() {
                return Err(Error::config(format!(
                    "{} must be an absolute path, got {}",
                    flag,
                    dir.display()
                )));
            }
        }

        if self.logging_containers_dir == self.logging_volumes_dir {
            return Err(Error::config(
                "logging-containers-dir and logging-volumes-dir must be different directories",
            ));
        }

        if self.logging_containers_dir.starts_with(&self.logging_volumes_dir)
            || self.logging_volumes_dir.starts_with(&self.logging_containers_dir)
        {
            return Err(Error::config("managed roots must not be nested in each other"));
        }

        self.volume_pattern()?;
        glob::Pattern::new(&self.logging_files_pattern).map_err(|e| {
            Error::config(format!(
                "Invalid logging-files-pattern '{}': {}",
                self.logging_files_pattern, e
            ))
        })?;

        if self.metadata_address.trim().is_empty() {
            return Err(Error::config("metadata-address must not be empty"));
        }

        for (name, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("resync_interval_secs", self.resync_interval_secs),
            ("poll_timeout_ms", self.poll_timeout_ms),
            ("backoff_initial_ms", self.backoff_initial_ms),
            ("pending_retry_ms", self.pending_retry_ms),
        ] {
            if value == 0 {
                return Err(Error::config(format!("{} must be greater than zero", name)));
            }
        }

        if self.backoff_max_ms < self.backoff_initial_ms {
            return Err(Error::config("backoff_max_ms must be >= backoff_initial_ms"));
        }

        if self.apply_concurrency == 0 {
            return Err(Error::config("apply_concurrency must be greater than zero"));
        }

        if self.root_failure_threshold == 0 {
            return Err(Error::config("root_failure_threshold must be greater than zero"));
        }

        Ok(())
    }

    /// Compiled pattern identifying log volumes
    pub fn volume_pattern(&self) -> Result<glob::Pattern> {
        glob::Pattern::new(&self.logging_volumes_pattern).map_err(|e| {
            Error::config(format!(
                "Invalid logging-volumes-pattern '{}': {}",
                self.logging_volumes_pattern, e
            ))
        })
    }

    /// Both managed roots, containers root first
    pub fn managed_roots(&self) -> [&Path; 2] {
        [self.logging_containers_dir.as_path(), self.logging_volumes_dir.as_path()]
    }

    pub fn metadata_url(&self) -> String {
        metadata_url(&self.metadata_address)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn pending_retry(&self) -> Duration {
        Duration::from_millis(self.pending_retry_ms)
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }
}

/// Configuration file structure (loglink.toml/yaml/json). Every key is optional.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    pub debug: Option<bool>,
    pub metadata_address: Option<String>,
    pub health_check_port: Option<u16>,
    pub docker_graph_dir: Option<PathBuf>,
    pub logging_containers_dir: Option<PathBuf>,
    pub logging_volumes_dir: Option<PathBuf>,
    pub logging_volumes_pattern: Option<String>,
    pub logging_files_pattern: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub resync_interval_secs: Option<u64>,
    pub poll_timeout_ms: Option<u64>,
    pub backoff_initial_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub pending_retry_ms: Option<u64>,
    pub apply_concurrency: Option<usize>,
    pub root_failure_threshold: Option<u32>,
    pub watch_roots: Option<bool>,
    pub watch_debounce_ms: Option<u64>,
}

impl ConfigFile {
    /// Load config from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Overlay the keys present in the file onto `settings`
    pub fn apply_to(self, settings: &mut Settings) {
        let file = self;

        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = file.$field {
                        settings.$field = value;
                    }
                )*
            };
        }

        overlay!(
            debug,
            metadata_address,
            health_check_port,
            docker_graph_dir,
            logging_containers_dir,
            logging_volumes_dir,
            logging_volumes_pattern,
            logging_files_pattern,
            poll_interval_ms,
            resync_interval_secs,
            poll_timeout_ms,
            backoff_initial_ms,
            backoff_max_ms,
            pending_retry_ms,
            apply_concurrency,
            root_failure_threshold,
            watch_roots,
            watch_debounce_ms,
        );
    }
}
