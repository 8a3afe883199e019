//! Snapshot to desired mapping

use loglink_core::{sanitize_name, ContainerRecord, MetadataSnapshot, Result, Settings};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

use crate::link::{DesiredMapping, LinkKind, LogLinkSpec};

/// Pure mapping from a metadata snapshot to the links that should exist
#[derive(Debug, Clone)]
pub struct Resolver {
    containers_dir: PathBuf,
    volumes_dir: PathBuf,
    volume_pattern: glob::Pattern,
}

impl Resolver {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            containers_dir: settings.logging_containers_dir.clone(),
            volumes_dir: settings.logging_volumes_dir.clone(),
            volume_pattern: settings.volume_pattern()?,
        })
    }

    /// Compute the desired mapping. Only running containers contribute;
    /// a stopped or removed container is dropped by its absence here.
    pub fn resolve(&self, snapshot: &MetadataSnapshot) -> DesiredMapping {
        let mut mapping = DesiredMapping::new();

        for record in snapshot.records().iter().filter(|r| r.state.is_running()) {
            let base = format!("{}_{}", sanitize_name(&record.name), record.id);

            if let Some(stdout) = &record.stdout_log {
                let spec = LogLinkSpec::new(
                    self.containers_dir.join(&base),
                    stdout,
                    LinkKind::ContainerStdout {
                        container_id: record.id.clone(),
                    },
                );
                insert_logged(&mut mapping, spec);
            }

            self.resolve_volumes(record, &base, &mut mapping);
        }

        mapping
    }

    fn resolve_volumes(&self, record: &ContainerRecord, base: &str, mapping: &mut DesiredMapping) {
        for (index, mount) in record.mounts.iter().enumerate() {
            if !mount.is_log_volume(&self.volume_pattern) {
                continue;
            }

            // A log volume without matching files contributes nothing
            for file in &mount.log_files {
                let Some(relative) = flatten_relative(&mount.source, file) else {
                    warn!(
                        "Ignoring {} outside volume source {}",
                        file.display(),
                        mount.source.display()
                    );
                    continue;
                };

                let spec = LogLinkSpec::new(
                    self.volumes_dir.join(format!("{}_{}_{}", base, index, relative)),
                    file,
                    LinkKind::CustomVolume {
                        container_id: record.id.clone(),
                        mount_index: index,
                    },
                );
                insert_logged(mapping, spec);
            }
        }
    }
}

/// Later entries win on collision
fn insert_logged(mapping: &mut DesiredMapping, spec: LogLinkSpec) {
    let link = spec.link.clone();
    let target = spec.target.clone();
    if let Some(previous) = mapping.insert(spec) {
        warn!(
            "Link {} resolved twice: {} replaces {}",
            link.display(),
            target.display(),
            previous.target.display()
        );
    }
}

/// `a/b/c.log` under `source` becomes `a_b_c.log`
fn flatten_relative(source: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(source).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => Some(sanitize_name(&part.to_string_lossy())),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("_"))
}
