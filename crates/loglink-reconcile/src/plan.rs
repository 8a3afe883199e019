//! Desired vs actual comparison

use loglink_core::constants::temp_link_owner;
use std::path::{Path, PathBuf};

use crate::actual::ActualState;
use crate::link::DesiredMapping;

/// One filesystem mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create { link: PathBuf, target: PathBuf },
    Replace { link: PathBuf, target: PathBuf },
    Remove { link: PathBuf },
}

impl Operation {
    pub fn link(&self) -> &Path {
        match self {
            Operation::Create { link, .. }
            | Operation::Replace { link, .. }
            | Operation::Remove { link } => link,
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Replace { .. } => "replace",
            Operation::Remove { .. } => "remove",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create { link, target } | Operation::Replace { link, target } => write!(
                f,
                "{} {} -> {}",
                self.action(),
                link.display(),
                target.display()
            ),
            Operation::Remove { link } => write!(f, "remove {}", link.display()),
        }
    }
}

/// Ordered operations that converge actual to desired
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    operations: Vec<Operation>,
}

impl ReconciliationPlan {
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<Operation> {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Counts of (create, replace, remove)
    pub fn summary(&self) -> (usize, usize, usize) {
        self.operations
            .iter()
            .fold((0, 0, 0), |(c, r, d), op| match op {
                Operation::Create { .. } => (c + 1, r, d),
                Operation::Replace { .. } => (c, r + 1, d),
                Operation::Remove { .. } => (c, r, d + 1),
            })
    }
}

/// Compare desired against actual. Removes come first, then creates and
/// replaces; each group is in path order. Paths already matching produce nothing.
/// Non-symlink entries that are not desired are left alone. A leftover
/// temporary sibling of a desired link is not removed here; the swap for
/// that link clears it, and no two operations share a path.
pub fn plan(desired: &DesiredMapping, actual: &ActualState) -> ReconciliationPlan {
    let mut operations: Vec<Operation> = actual
        .iter()
        .filter(|entry| entry.is_symlink() && !desired.contains(&entry.path))
        .filter(|entry| match temp_link_owner(&entry.path) {
            Some(owner) => !desired.contains(&owner),
            None => true,
        })
        .map(|entry| Operation::Remove {
            link: entry.path.clone(),
        })
        .collect();

    for spec in desired.iter() {
        match actual.get(&spec.link) {
            None => operations.push(Operation::Create {
                link: spec.link.clone(),
                target: spec.target.clone(),
            }),
            Some(entry) if entry.target.as_deref() == Some(spec.target.as_path()) => {}
            Some(_) => operations.push(Operation::Replace {
                link: spec.link.clone(),
                target: spec.target.clone(),
            }),
        }
    }

    ReconciliationPlan { operations }
}
