//! Actual state of the managed roots

use loglink_core::{Error, Result};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One entry found directly under a managed root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActualEntry {
    pub path: PathBuf,
    pub root: PathBuf,
    /// Symlink target, `None` when the entry is not a symlink
    pub target: Option<PathBuf>,
}

impl ActualEntry {
    pub fn is_symlink(&self) -> bool {
        self.target.is_some()
    }
}

/// Entries of all managed roots, keyed by path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActualState {
    entries: BTreeMap<PathBuf, ActualEntry>,
}

impl ActualState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: ActualEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn get(&self, path: &Path) -> Option<&ActualEntry> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActualEntry> {
        self.entries.values()
    }
}

/// List every managed root, creating roots that do not exist yet.
///
/// A root that cannot be created or listed is `RootInaccessible`.
pub async fn scan(roots: &[&Path]) -> Result<ActualState> {
    let mut state = ActualState::new();

    for root in roots {
        scan_root(root, &mut state).await?;
    }

    Ok(state)
}

async fn scan_root(root: &Path, state: &mut ActualState) -> Result<()> {
    let inaccessible = |e: std::io::Error| Error::RootInaccessible {
        path: root.to_path_buf(),
        reason: e.to_string(),
    };

    match tokio::fs::symlink_metadata(root).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(Error::RootInaccessible {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::create_dir_all(root).await.map_err(inaccessible)?;
            info!("Created managed root {}", root.display());
            return Ok(());
        }
        Err(e) => return Err(inaccessible(e)),
    }

    let mut dir = tokio::fs::read_dir(root).await.map_err(inaccessible)?;

    while let Some(entry) = dir.next_entry().await.map_err(inaccessible)? {
        let path = entry.path();

        // Entries may disappear while we look at them
        let meta = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(inaccessible(e)),
        };

        let target = if meta.file_type().is_symlink() {
            match tokio::fs::read_link(&path).await {
                Ok(target) => Some(target),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(inaccessible(e)),
            }
        } else {
            debug!("Found non-symlink entry {}", path.display());
            None
        };

        state.insert(ActualEntry {
            path,
            root: root.to_path_buf(),
            target,
        });
    }

    Ok(())
}
