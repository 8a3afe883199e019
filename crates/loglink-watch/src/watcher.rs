//! Managed-root watcher using notify

use loglink_core::constants::TEMP_LINK_SUFFIX;
use loglink_core::{Error, Result, Settings};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;

/// Watch configuration
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub roots: Vec<PathBuf>,
    pub debounce: Duration,
}

impl WatchConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            roots: settings
                .managed_roots()
                .iter()
                .map(|root| root.to_path_buf())
                .collect(),
            debounce: settings.watch_debounce(),
        }
    }
}

/// Watches the managed roots (non-recursively) and fires a trigger once a
/// burst of external changes settles
pub struct RootWatcher {
    watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
    debouncer: Arc<Mutex<Debouncer>>,
    wake: Arc<Notify>,
    watched: Vec<PathBuf>,
}

impl RootWatcher {
    pub fn new(config: WatchConfig) -> Result<Self> {
        let debouncer = Arc::new(Mutex::new(Debouncer::new(config.debounce)));
        let wake = Arc::new(Notify::new());
        let ignore = temp_pattern()?;

        let watcher = {
            let debouncer = Arc::clone(&debouncer);
            let wake = Arc::clone(&wake);

            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !is_relevant(&event.kind) {
                        return;
                    }
                    let paths: Vec<PathBuf> = event
                        .paths
                        .into_iter()
                        .filter(|p| !is_ignored(&ignore, p))
                        .collect();
                    if paths.is_empty() {
                        return;
                    }

                    debug!("Watch event: {:?} on {:?}", event.kind, paths);
                    debouncer.lock().record(paths, Instant::now());
                    wake.notify_one();
                }
                Err(e) => warn!("Watch error: {}", e),
            })
            .map_err(|e| Error::config(format!("Failed to create watcher: {}", e)))?
        };

        Ok(Self {
            watcher,
            roots: config.roots,
            debouncer,
            wake,
            watched: Vec::new(),
        })
    }

    /// Start watching every configured root. Roots must already exist.
    pub fn watch_roots(&mut self) -> Result<()> {
        for root in self.roots.clone() {
            self.watcher
                .watch(&root, RecursiveMode::NonRecursive)
                .map_err(|e| Error::config(format!("Failed to watch {}: {}", root.display(), e)))?;

            info!("Watching managed root {}", root.display());
            self.watched.push(root);
        }
        Ok(())
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Forward settled bursts to `trigger` until shutdown
    pub async fn run(self, trigger: Arc<Notify>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.wake.notified() => {}
            }

            // Wait for the burst to go quiet
            loop {
                let deadline = self.debouncer.lock().deadline();
                let Some(deadline) = deadline else {
                    break;
                };

                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                }

                let drained = self.debouncer.lock().take_if_quiet(Instant::now());
                if let Some(paths) = drained {
                    debug!(changed = paths.len(), "Managed roots changed externally");
                    trigger.notify_one();
                    break;
                }
            }
        }

        debug!("Root watcher stopped");
    }
}

fn temp_pattern() -> Result<glob::Pattern> {
    glob::Pattern::new(&format!(".*{}", TEMP_LINK_SUFFIX))
        .map_err(|e| Error::config(format!("Invalid ignore pattern: {}", e)))
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Our own temporary links come and go on every swap
fn is_ignored(pattern: &glob::Pattern, path: &Path) -> bool {
    path.file_name()
        .map(|name| pattern.matches(&name.to_string_lossy()))
        .unwrap_or(false)
}
