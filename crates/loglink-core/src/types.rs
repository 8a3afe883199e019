//! Core types for loglink

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Characters allowed verbatim in a link file name
static LINK_NAME_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("Invalid link name regex"));

/// Make a container or file name safe for use as one path component.
/// Leading dots are replaced so a link can never be hidden or climb out of its root.
pub fn sanitize_name(name: &str) -> String {
    let cleaned = LINK_NAME_UNSAFE.replace_all(name, "_");
    let trimmed = cleaned.trim_start_matches('.');
    let dots = cleaned.len() - trimmed.len();
    format!("{}{}", "_".repeat(dots), trimmed)
}

/// Lifecycle state of a container as reported by metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Stopped,
    Removed,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::Removed => "removed",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerState::Running)
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ContainerState {
    type Err = Error;

    /// Metadata reports many transitional states; anything that is neither
    /// running nor on its way out counts as stopped.
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_lowercase().as_str() {
            "running" => ContainerState::Running,
            "removed" | "removing" | "purged" | "purging" => ContainerState::Removed,
            _ => ContainerState::Stopped,
        })
    }
}

/// A volume mounted into a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Docker volume name (empty for bind mounts)
    #[serde(default)]
    pub name: String,
    /// Path of the mount on the host
    pub source: PathBuf,
    /// Path of the mount inside the container
    pub destination: PathBuf,
    /// Files under `source` matching the log file pattern
    #[serde(default)]
    pub log_files: Vec<PathBuf>,
}

impl VolumeMount {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            destination: destination.into(),
            log_files: Vec::new(),
        }
    }

    pub fn with_log_files(mut self, files: Vec<PathBuf>) -> Self {
        self.log_files = files;
        self
    }

    /// A mount is a log volume when the pattern matches its volume name or
    /// any component of its host source path
    pub fn is_log_volume(&self, pattern: &glob::Pattern) -> bool {
        if !self.name.is_empty() && pattern.matches(&self.name) {
            return true;
        }

        self.source.components().any(|c| match c {
            std::path::Component::Normal(name) => {
                name.to_str().map(|s| pattern.matches(s)).unwrap_or(false)
            }
            _ => false,
        })
    }
}

/// One container known to run on the local host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Docker container id, unique on the host
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    /// Stdout log file, `None` while the runtime has not made it visible yet
    pub stdout_log: Option<PathBuf>,
    /// The runtime writes no stdout log file (non-file logging driver)
    #[serde(default)]
    pub no_stdout_log: bool,
    #[serde(default)]
    pub mounts: Vec<VolumeMount>,
}

impl ContainerRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: ContainerState) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state,
            stdout_log: None,
            no_stdout_log: false,
            mounts: Vec::new(),
        }
    }

    pub fn with_stdout_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_log = Some(path.into());
        self
    }

    pub fn with_mounts(mut self, mounts: Vec<VolumeMount>) -> Self {
        self.mounts = mounts;
        self
    }

    /// Running, but its stdout log is not visible on disk yet
    pub fn is_pending(&self) -> bool {
        self.state.is_running() && self.stdout_log.is_none() && !self.no_stdout_log
    }
}

/// Immutable point-in-time view of the containers on this host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSnapshot {
    version: String,
    records: Vec<ContainerRecord>,
}

impl MetadataSnapshot {
    /// Build a snapshot, rejecting duplicate container ids
    pub fn new(version: impl Into<String>, records: Vec<ContainerRecord>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id.as_str()) {
                return Err(Error::DuplicateContainer(record.id.clone()));
            }
        }

        Ok(Self {
            version: version.into(),
            records,
        })
    }

    /// Metadata version the snapshot was taken at
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn records(&self) -> &[ContainerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of running containers whose stdout log is not yet visible
    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_pending()).count()
    }
}

/// State of the reconciliation loop, published to the liveness endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    #[default]
    Idle,
    Polling,
    Backoff,
    Resolving,
    Applying,
    Fatal,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Polling => "polling",
            LoopState::Backoff => "backoff",
            LoopState::Resolving => "resolving",
            LoopState::Applying => "applying",
            LoopState::Fatal => "fatal",
        }
    }

    pub fn is_alive(&self) -> bool {
        !matches!(self, LoopState::Fatal)
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the loop publishes after every transition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStatus {
    pub state: LoopState,
    pub last_success: Option<DateTime<Utc>>,
    /// Failed polls since the last success
    pub consecutive_failures: u32,
    /// Set once the loop turned fatal
    pub fatal_reason: Option<String>,
}

impl LoopStatus {
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }
}
