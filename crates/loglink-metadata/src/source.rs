//! Snapshot source and change notification

use async_trait::async_trait;
use loglink_core::{ContainerRecord, ContainerState, Error, MetadataSnapshot, Result, Settings};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::docker::{find_log_files, DockerRuntime};
use crate::{MetadataClient, MetadataContainer, SnapshotSource};

/// Builds snapshots of the local host from metadata plus the runtime root
pub struct MetadataSnapshotSource {
    client: Arc<dyn MetadataClient>,
    runtime: DockerRuntime,
    volume_pattern: glob::Pattern,
    files_pattern: String,
    timeout: Duration,
}

impl MetadataSnapshotSource {
    pub fn new(client: Arc<dyn MetadataClient>, settings: &Settings) -> Result<Self> {
        Ok(Self {
            client,
            runtime: DockerRuntime::new(&settings.docker_graph_dir),
            volume_pattern: settings.volume_pattern()?,
            files_pattern: settings.logging_files_pattern.clone(),
            timeout: settings.poll_timeout(),
        })
    }

    async fn fetch(&self) -> Result<MetadataSnapshot> {
        let version = self.client.version().await?;
        let host = self.client.self_host().await?;
        let containers = self.client.containers().await?;

        let local: Vec<MetadataContainer> = containers
            .into_iter()
            .filter(|c| c.host_uuid == host.uuid)
            .filter(|c| {
                if c.external_id.is_empty() {
                    // Scheduled but not created by Docker yet
                    return false;
                }
                if !DockerRuntime::is_valid_id(&c.external_id) {
                    warn!("Ignoring container {} with malformed id '{}'", c.name, c.external_id);
                    return false;
                }
                true
            })
            .collect();

        debug!(
            "Metadata version {}: {} containers on host {}",
            version,
            local.len(),
            host.uuid
        );

        let runtime = self.runtime.clone();
        let volume_pattern = self.volume_pattern.clone();
        let files_pattern = self.files_pattern.clone();

        // Runtime inspection and globbing touch the disk
        let records = tokio::task::spawn_blocking(move || {
            local
                .into_iter()
                .map(|c| build_record(&runtime, &volume_pattern, &files_pattern, c))
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| Error::transient(format!("Snapshot task failed: {}", e)))??;

        MetadataSnapshot::new(version, records)
    }
}

fn build_record(
    runtime: &DockerRuntime,
    volume_pattern: &glob::Pattern,
    files_pattern: &str,
    container: MetadataContainer,
) -> Result<ContainerRecord> {
    let state: ContainerState = container.state.parse()?;
    let mut record = ContainerRecord::new(container.external_id, container.name, state);

    if !state.is_running() {
        return Ok(record);
    }

    let info = match runtime.inspect(&record.id) {
        Ok(info) => info,
        Err(e) => {
            // Treated like a log that is not visible yet; retried next cycle
            warn!("Failed to inspect runtime state of {} ({}): {}", record.name, record.id, e);
            return Ok(record);
        }
    };
    record.stdout_log = info.stdout_log;
    record.no_stdout_log = info.no_stdout_log;
    record.mounts = info
        .mounts
        .into_iter()
        .map(|mount| {
            if mount.is_log_volume(volume_pattern) {
                let files = find_log_files(&mount.source, files_pattern);
                mount.with_log_files(files)
            } else {
                mount
            }
        })
        .collect();

    Ok(record)
}

#[async_trait]
impl SnapshotSource for MetadataSnapshotSource {
    async fn poll(&self) -> Result<MetadataSnapshot> {
        match tokio::time::timeout(self.timeout, self.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(Error::transient(format!(
                "Metadata poll timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

/// Watches the metadata version and wakes the loop when it changes.
///
/// Uses a single `Notify` permit, so any number of changes while a cycle is
/// running collapse into one follow-up cycle.
pub struct ChangeNotifier {
    client: Arc<dyn MetadataClient>,
    interval: Duration,
    trigger: Arc<Notify>,
}

impl ChangeNotifier {
    pub fn new(client: Arc<dyn MetadataClient>, interval: Duration, trigger: Arc<Notify>) -> Self {
        Self {
            client,
            interval,
            trigger,
        }
    }

    /// Poll until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut last_version: Option<String> = None;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Watching metadata version every {:?}", self.interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.client.version().await {
                        Ok(version) => {
                            if last_version.as_deref() != Some(version.as_str()) {
                                debug!("Metadata version changed to {}", version);
                                last_version = Some(version);
                                self.trigger.notify_one();
                            }
                        }
                        Err(e) => {
                            // The loop's own poll reports and retries fetch errors
                            debug!("Version check failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}
