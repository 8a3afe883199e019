//! Daemon orchestration: builds the components and supervises the units

use anyhow::{anyhow, Context, Result};
use loglink_core::Settings;
use loglink_health::HealthState;
use loglink_metadata::{ChangeNotifier, MetadataClient, MetadataSnapshotSource, RancherClient};
use loglink_watch::{RootWatcher, WatchConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{watch, Notify};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::engine::ReconcileLoop;

/// A supervised unit. The first one to finish brings the daemon down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    MetadataWatcher,
    HealthCheck,
}

impl Unit {
    pub fn exit_message(&self) -> &'static str {
        match self {
            Unit::MetadataWatcher => "Metadata watcher exited",
            Unit::HealthCheck => "Healthcheck provider died.",
        }
    }
}

/// Turn a finished unit into the daemon's exit error
fn unit_failure(unit: Unit, result: Result<()>) -> anyhow::Error {
    let err = match result {
        Ok(()) => anyhow!("unit stopped without an error"),
        Err(e) => e,
    };
    err.context(unit.exit_message())
}

pub struct Daemon {
    settings: Settings,
}

impl Daemon {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Run until a unit finishes (error) or a termination signal arrives (ok)
    pub async fn run(self) -> Result<()> {
        let settings = self.settings;

        let client: Arc<dyn MetadataClient> = Arc::new(
            RancherClient::new(settings.metadata_url(), settings.poll_timeout())
                .context("Failed to create metadata client")?,
        );
        let source = Arc::new(
            MetadataSnapshotSource::new(Arc::clone(&client), &settings)
                .context("Failed to create snapshot source")?,
        );

        let trigger = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let engine = ReconcileLoop::new(&settings, source, Arc::clone(&trigger))
            .context("Failed to create reconciliation loop")?;
        let health = HealthState::new(engine.subscribe());

        // Bind before anything runs so a taken port fails fast
        let addr = SocketAddr::from(([0, 0, 0, 0], settings.health_check_port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))
            .context(Unit::HealthCheck.exit_message())?;
        info!("Healthcheck listening on {}", listener.local_addr()?);

        // Helpers only feed the trigger; they are stopped with the daemon
        let mut helpers = JoinSet::new();
        let notifier = ChangeNotifier::new(client, settings.poll_interval(), Arc::clone(&trigger));
        helpers.spawn(notifier.run(shutdown_rx.clone()));
        if settings.watch_roots {
            match start_root_watcher(&settings).await {
                Ok(watcher) => {
                    helpers.spawn(watcher.run(Arc::clone(&trigger), shutdown_rx.clone()));
                }
                Err(e) => warn!("Not watching managed roots: {:#}", e),
            }
        }

        let mut units: JoinSet<(Unit, Result<()>)> = JoinSet::new();
        {
            let shutdown = shutdown_rx.clone();
            units.spawn(async move {
                let result = engine.run(shutdown).await.map_err(anyhow::Error::from);
                (Unit::MetadataWatcher, result)
            });
        }
        units.spawn(async move {
            let result = loglink_health::serve(listener, health)
                .await
                .map_err(anyhow::Error::from);
            (Unit::HealthCheck, result)
        });

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        info!("loglinkd running");

        let finished = tokio::select! {
            joined = units.join_next() => joined,
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                None
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                None
            }
        };

        let _ = shutdown_tx.send(true);

        let outcome = match finished {
            None => {
                // Let the loop finish its current cycle
                while let Some(joined) = units.join_next().await {
                    if let Ok((Unit::MetadataWatcher, result)) = joined {
                        if let Err(e) = result {
                            warn!("Loop reported an error while stopping: {:#}", e);
                        }
                        break;
                    }
                }
                Ok(())
            }
            Some(Ok((unit, result))) => Err(unit_failure(unit, result)),
            Some(Err(e)) => Err(anyhow!(e).context("Supervised unit panicked")),
        };

        units.abort_all();
        helpers.abort_all();
        while helpers.join_next().await.is_some() {}
        debug!("All units stopped");

        outcome
    }
}

/// Roots must exist before they can be watched
async fn start_root_watcher(settings: &Settings) -> Result<RootWatcher> {
    for root in settings.managed_roots() {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create {}", root.display()))?;
    }

    let mut watcher = RootWatcher::new(WatchConfig::from_settings(settings))?;
    watcher.watch_roots()?;
    Ok(watcher)
}
