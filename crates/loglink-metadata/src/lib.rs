//! loglink metadata - snapshot source over the cluster metadata service
//!
//! Provides:
//! - `RancherClient`, the HTTP transport for the metadata API
//! - `DockerRuntime`, a read-only view of the Docker runtime root
//! - `MetadataSnapshotSource`, which combines both into `MetadataSnapshot`s
//! - `ChangeNotifier`, which signals when the metadata version moves

mod client;
mod docker;
#[cfg(test)]
pub mod mock;
mod source;

pub use client::RancherClient;
pub use docker::{find_log_files, DockerRuntime, RuntimeInfo};
pub use source::{ChangeNotifier, MetadataSnapshotSource};

use async_trait::async_trait;
use loglink_core::{MetadataSnapshot, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Host record from `/self/host`
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HostInfo {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hostname: String,
}

/// Container record from `/containers`
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct MetadataContainer {
    pub name: String,
    #[serde(default)]
    pub uuid: String,
    /// Docker container id, empty until the container is created on the host
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub host_uuid: String,
    #[serde(default)]
    pub stack_name: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// Typed access to the metadata service
#[async_trait]
pub trait MetadataClient: Send + Sync {
    /// Current metadata version, changes whenever any record changes
    async fn version(&self) -> Result<String>;

    /// The host this daemon runs on
    async fn self_host(&self) -> Result<HostInfo>;

    /// Every container known to the environment
    async fn containers(&self) -> Result<Vec<MetadataContainer>>;
}

/// Producer of point-in-time snapshots of the local host
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Take a snapshot; fails with `TransientFetch` or `FatalProtocol`
    async fn poll(&self) -> Result<MetadataSnapshot>;
}
