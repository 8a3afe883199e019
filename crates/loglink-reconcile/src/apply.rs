//! Plan execution with per-entry failure isolation

use futures::stream::{self, StreamExt};
use loglink_core::constants::temp_link_path;
use loglink_core::Error;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::plan::{Operation, ReconciliationPlan};

/// errno for a read-only filesystem on Linux and macOS
const EROFS: i32 = 30;

/// An operation that could not be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOp {
    pub op: Operation,
    pub reason: String,
    pub kind: ErrorKind,
    /// Permission or read-only failure, i.e. the root itself may be unwritable
    pub denied: bool,
}

impl SkippedOp {
    pub fn to_error(&self) -> Error {
        Error::PlanApply {
            path: self.op.link().to_path_buf(),
            reason: self.reason.clone(),
        }
    }
}

/// Outcome of one apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedResult {
    pub applied: Vec<Operation>,
    pub skipped: Vec<SkippedOp>,
}

impl AppliedResult {
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
    }

    /// Roots where every attempted operation was denied
    pub fn denied_roots(&self) -> BTreeSet<PathBuf> {
        // root -> (succeeded, denied)
        let mut per_root: BTreeMap<PathBuf, (usize, usize)> = BTreeMap::new();

        for op in &self.applied {
            if let Some(root) = op.link().parent() {
                per_root.entry(root.to_path_buf()).or_default().0 += 1;
            }
        }
        for skipped in self.skipped.iter().filter(|s| s.denied) {
            if let Some(root) = skipped.op.link().parent() {
                per_root.entry(root.to_path_buf()).or_default().1 += 1;
            }
        }

        per_root
            .into_iter()
            .filter(|(_, (ok, denied))| *ok == 0 && *denied > 0)
            .map(|(root, _)| root)
            .collect()
    }
}

/// Applies plans inside a fixed set of managed roots
#[derive(Debug, Clone)]
pub struct Applier {
    roots: Vec<PathBuf>,
    concurrency: usize,
}

impl Applier {
    pub fn new(roots: Vec<PathBuf>, concurrency: usize) -> Self {
        Self {
            roots,
            concurrency: concurrency.max(1),
        }
    }

    /// Attempt every operation of the plan. Removes finish before any
    /// create or replace starts; within each group operations touch
    /// distinct paths and run concurrently up to the configured limit.
    pub async fn apply(&self, plan: ReconciliationPlan) -> AppliedResult {
        let (removes, swaps): (Vec<Operation>, Vec<Operation>) = plan
            .into_operations()
            .into_iter()
            .partition(|op| matches!(op, Operation::Remove { .. }));

        let mut result = AppliedResult::default();
        for group in [removes, swaps] {
            let outcomes: Vec<Result<Operation, SkippedOp>> = stream::iter(group)
                .map(|op| self.apply_one(op))
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for outcome in outcomes {
                match outcome {
                    Ok(op) => result.applied.push(op),
                    Err(skipped) => result.skipped.push(skipped),
                }
            }
        }
        result
    }

    async fn apply_one(&self, op: Operation) -> Result<Operation, SkippedOp> {
        if !self.is_managed(op.link()) {
            warn!(link = %op.link().display(), "Refusing to {} outside managed roots", op.action());
            return Err(SkippedOp {
                reason: "outside managed roots".to_string(),
                kind: ErrorKind::InvalidInput,
                denied: false,
                op,
            });
        }

        let outcome = match &op {
            Operation::Create { link, target } | Operation::Replace { link, target } => {
                swap_link(link, target).await
            }
            Operation::Remove { link } => remove_link(link).await,
        };

        match outcome {
            Ok(()) => {
                info!("Applied {}", op);
                Ok(op)
            }
            Err(e) => {
                let skipped = SkippedOp {
                    reason: e.to_string(),
                    kind: e.kind(),
                    denied: is_denied(&e),
                    op,
                };
                warn!(action = skipped.op.action(), "{}", skipped.to_error());
                Err(skipped)
            }
        }
    }

    /// Links live directly inside a root
    fn is_managed(&self, link: &Path) -> bool {
        match link.parent() {
            Some(parent) => self.roots.iter().any(|root| root == parent),
            None => false,
        }
    }
}

fn is_denied(e: &io::Error) -> bool {
    e.kind() == ErrorKind::PermissionDenied || e.raw_os_error() == Some(EROFS)
}

/// Point `link` at `target` without a window where `link` is missing:
/// the new symlink is created under a temporary sibling and renamed over.
async fn swap_link(link: &Path, target: &Path) -> io::Result<()> {
    // The log may have vanished since the snapshot was taken
    if let Err(e) = tokio::fs::metadata(target).await {
        if e.kind() == ErrorKind::NotFound {
            return Err(io::Error::new(
                ErrorKind::NotFound,
                format!("target {} vanished", target.display()),
            ));
        }
    }

    let temp = temp_link_path(link);
    match tokio::fs::remove_file(&temp).await {
        Ok(()) => debug!("Removed leftover {}", temp.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    tokio::fs::symlink(target, &temp).await?;

    if let Err(e) = tokio::fs::rename(&temp, link).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e);
    }

    Ok(())
}

/// Removing a link that is already gone counts as done
async fn remove_link(link: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(link).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} already removed", link.display());
            Ok(())
        }
        Err(e) => Err(e),
    }
}
