//! Trailing-edge debounce for watch events

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Collects changed paths until the roots have been quiet for `quiet`
pub struct Debouncer {
    quiet: Duration,
    pending: BTreeSet<PathBuf>,
    last_event: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: BTreeSet::new(),
            last_event: None,
        }
    }

    /// Record a burst member; every event pushes the deadline out
    pub fn record<I>(&mut self, paths: I, now: Instant)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.pending.extend(paths);
        self.last_event = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.last_event.is_some()
    }

    /// When the current burst settles, if there is one
    pub fn deadline(&self) -> Option<Instant> {
        self.last_event.map(|last| last + self.quiet)
    }

    /// Drain the burst once it has been quiet long enough
    pub fn take_if_quiet(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.last_event = None;
                Some(std::mem::take(&mut self.pending).into_iter().collect())
            }
            _ => None,
        }
    }
}
