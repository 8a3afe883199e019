//! Reconciliation loop

use chrono::Utc;
use loglink_core::{Error, LoopState, LoopStatus, MetadataSnapshot, Result, Settings};
use loglink_metadata::SnapshotSource;
use loglink_reconcile::{plan, scan, AppliedResult, Applier, Resolver};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Drives poll, resolve, scan, plan and apply, one cycle at a time
pub struct ReconcileLoop {
    source: Arc<dyn SnapshotSource>,
    resolver: Resolver,
    applier: Applier,
    roots: Vec<PathBuf>,
    trigger: Arc<Notify>,
    status: watch::Sender<LoopStatus>,
    backoff_initial: Duration,
    backoff_max: Duration,
    resync_interval: Duration,
    pending_retry: Duration,
    root_failure_threshold: u32,
    /// Consecutive all-denied cycles per root
    strikes: HashMap<PathBuf, u32>,
}

impl ReconcileLoop {
    pub fn new(
        settings: &Settings,
        source: Arc<dyn SnapshotSource>,
        trigger: Arc<Notify>,
    ) -> Result<Self> {
        let roots: Vec<PathBuf> = settings
            .managed_roots()
            .iter()
            .map(|root| root.to_path_buf())
            .collect();
        let (status, _) = watch::channel(LoopStatus::default());

        Ok(Self {
            source,
            resolver: Resolver::new(settings)?,
            applier: Applier::new(roots.clone(), settings.apply_concurrency),
            roots,
            trigger,
            status,
            backoff_initial: settings.backoff_initial(),
            backoff_max: settings.backoff_max(),
            resync_interval: settings.resync_interval(),
            pending_retry: settings.pending_retry(),
            root_failure_threshold: settings.root_failure_threshold,
            strikes: HashMap::new(),
        })
    }

    /// Follow the loop status (state, last success)
    pub fn subscribe(&self) -> watch::Receiver<LoopStatus> {
        self.status.subscribe()
    }

    /// Run cycles until shutdown. Returns the error that made the loop fatal.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut resync = tokio::time::interval_at(
            Instant::now() + self.resync_interval,
            self.resync_interval,
        );
        resync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pending = match self.cycle(&mut shutdown).await {
                Ok(Some(pending)) => pending,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Reconciliation loop is fatal");
                    self.status.send_modify(|s| {
                        s.state = LoopState::Fatal;
                        s.fatal_reason = Some(e.to_string());
                    });
                    return Err(e);
                }
            };

            self.set_state(LoopState::Idle);
            resync.reset();

            let retry_at = (pending > 0).then(|| {
                debug!(pending, "Logs not visible yet, retrying in {:?}", self.pending_retry);
                Instant::now() + self.pending_retry
            });
            let retry = async move {
                match retry_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = self.trigger.notified() => debug!("Cycle triggered by change notification"),
                _ = resync.tick() => debug!("Periodic resync"),
                _ = retry => debug!("Retrying pending containers"),
            }
        }

        info!("Reconciliation loop stopped");
        Ok(())
    }

    /// One full pass. `Ok(None)` means shutdown was requested while backing
    /// off; otherwise the number of containers whose logs are still missing.
    async fn cycle(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<Option<usize>> {
        let Some(snapshot) = self.poll_with_backoff(shutdown).await? else {
            return Ok(None);
        };

        self.set_state(LoopState::Resolving);
        let desired = self.resolver.resolve(&snapshot);

        let roots: Vec<&Path> = self.roots.iter().map(PathBuf::as_path).collect();
        let actual = scan(&roots).await?;
        let plan = plan(&desired, &actual);

        self.set_state(LoopState::Applying);
        let (create, replace, remove) = plan.summary();
        let result = if plan.is_empty() {
            AppliedResult::default()
        } else {
            self.applier.apply(plan).await
        };

        self.record_root_failures(&result)?;

        info!(
            version = snapshot.version(),
            containers = snapshot.len(),
            links = desired.len(),
            create,
            replace,
            remove,
            skipped = result.skipped.len(),
            "Reconciliation cycle complete"
        );

        self.status.send_modify(|s| {
            s.last_success = Some(Utc::now());
            s.consecutive_failures = 0;
        });

        Ok(Some(snapshot.pending_count()))
    }

    async fn poll_with_backoff(
        &mut self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<MetadataSnapshot>> {
        let mut delay = self.backoff_initial;

        loop {
            self.set_state(LoopState::Polling);

            let err = match self.source.poll().await {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => e,
            };

            if !err.is_transient() {
                debug!("Treating unclassified poll error as transient");
            }

            self.status.send_modify(|s| s.consecutive_failures += 1);
            warn!(error = %err, retry_in = ?delay, "Metadata poll failed");
            self.set_state(LoopState::Backoff);

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(None);
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }

            delay = (delay * 2).min(self.backoff_max);
        }
    }

    /// A root whose every operation was denied gets a strike, any success
    /// clears it. Too many strikes in a row and the root is unwritable.
    fn record_root_failures(&mut self, result: &AppliedResult) -> Result<()> {
        let denied = result.denied_roots();

        for root in &self.roots {
            if denied.contains(root) {
                let strikes = self.strikes.entry(root.clone()).or_insert(0);
                *strikes += 1;
                warn!(
                    root = %root.display(),
                    strikes = *strikes,
                    threshold = self.root_failure_threshold,
                    "Every operation in managed root was denied"
                );
                if *strikes >= self.root_failure_threshold {
                    return Err(Error::RootUnwritable(root.clone()));
                }
            } else if result
                .applied
                .iter()
                .any(|op| op.link().parent() == Some(root.as_path()))
            {
                self.strikes.remove(root);
            }
        }

        Ok(())
    }

    fn set_state(&self, state: LoopState) {
        self.status.send_if_modified(|s| {
            if s.state == state {
                return false;
            }
            debug!("Loop state {} -> {}", s.state, state);
            s.state = state;
            true
        });
    }
}
