//! Desired link entries

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What a managed link points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkKind {
    /// The container's stdout log on the runtime root
    ContainerStdout { container_id: String },
    /// A log file inside a log volume of the container
    CustomVolume {
        container_id: String,
        mount_index: usize,
    },
}

impl LinkKind {
    pub fn container_id(&self) -> &str {
        match self {
            LinkKind::ContainerStdout { container_id } => container_id,
            LinkKind::CustomVolume { container_id, .. } => container_id,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::ContainerStdout { .. } => "container-stdout",
            LinkKind::CustomVolume { .. } => "custom-volume",
        }
    }
}

/// One desired `link -> target` entry under a managed root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLinkSpec {
    pub link: PathBuf,
    pub target: PathBuf,
    pub kind: LinkKind,
}

impl LogLinkSpec {
    pub fn new(link: impl Into<PathBuf>, target: impl Into<PathBuf>, kind: LinkKind) -> Self {
        Self {
            link: link.into(),
            target: target.into(),
            kind,
        }
    }
}

/// The full desired layout, keyed by link path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredMapping {
    links: BTreeMap<PathBuf, LogLinkSpec>,
}

impl DesiredMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a spec, returning the one it displaced on a link-path collision
    pub fn insert(&mut self, spec: LogLinkSpec) -> Option<LogLinkSpec> {
        self.links.insert(spec.link.clone(), spec)
    }

    pub fn get(&self, link: &Path) -> Option<&LogLinkSpec> {
        self.links.get(link)
    }

    pub fn contains(&self, link: &Path) -> bool {
        self.links.contains_key(link)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Specs in link-path order
    pub fn iter(&self) -> impl Iterator<Item = &LogLinkSpec> {
        self.links.values()
    }
}

impl FromIterator<LogLinkSpec> for DesiredMapping {
    fn from_iter<I: IntoIterator<Item = LogLinkSpec>>(iter: I) -> Self {
        let mut mapping = DesiredMapping::new();
        for spec in iter {
            mapping.insert(spec);
        }
        mapping
    }
}
