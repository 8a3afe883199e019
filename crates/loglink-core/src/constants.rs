//! Constants and default values for loglink

use std::path::{Path, PathBuf};

/// Metadata API version this daemon speaks
pub const METADATA_API_VERSION: &str = "2016-07-29";

/// Default metadata service address
pub const DEFAULT_METADATA_ADDRESS: &str = "rancher-metadata.rancher.internal";

/// Default port for the liveness endpoint
pub const DEFAULT_HEALTH_CHECK_PORT: u16 = 9898;

/// Default root of the Docker runtime
pub const DEFAULT_DOCKER_GRAPH_DIR: &str = "/var/lib/docker";

/// Default managed root for per-container stdout links
pub const DEFAULT_LOGGING_CONTAINERS_DIR: &str = "/var/log/logging-containers";

/// Default managed root for custom volume links
pub const DEFAULT_LOGGING_VOLUMES_DIR: &str = "/var/log/logging-volumes";

/// Default pattern identifying log volumes
pub const DEFAULT_LOGGING_VOLUMES_PATTERN: &str = "rancher-logging*";

/// Default pattern identifying log files inside a log volume
pub const DEFAULT_LOGGING_FILES_PATTERN: &str = "*.log";

/// Default interval between metadata version checks in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default interval between unconditional full resyncs in seconds
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 60;

/// Default timeout for one metadata poll in milliseconds
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 10_000;

/// Default first backoff delay after a transient fetch error in milliseconds
pub const DEFAULT_BACKOFF_INITIAL_MS: u64 = 500;

/// Default cap on the backoff delay in milliseconds
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before re-checking containers whose log file is not yet visible
pub const DEFAULT_PENDING_RETRY_MS: u64 = 2_000;

/// Default number of filesystem operations applied concurrently
pub const DEFAULT_APPLY_CONCURRENCY: usize = 8;

/// Consecutive all-failed cycles on a root before it is declared unwritable
pub const DEFAULT_ROOT_FAILURE_THRESHOLD: u32 = 3;

/// Default debounce time for managed-root watch events in milliseconds
pub const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 500;

/// Suffix for the temporary sibling used by atomic link replacement
pub const TEMP_LINK_SUFFIX: &str = ".loglink-tmp";

/// Docker per-container config file name
pub const DOCKER_CONFIG_FILE: &str = "config.v2.json";

/// Base URL of the metadata API for an address
pub fn metadata_url(address: &str) -> String {
    format!("http://{}/{}", address, METADATA_API_VERSION)
}

/// Directory Docker keeps a container's state in
pub fn docker_container_dir(graph_dir: &Path, container_id: &str) -> PathBuf {
    graph_dir.join("containers").join(container_id)
}

/// Default json-file stdout log of a container
pub fn docker_stdout_log(graph_dir: &Path, container_id: &str) -> PathBuf {
    docker_container_dir(graph_dir, container_id).join(format!("{}-json.log", container_id))
}

/// Temporary sibling name used while replacing a link
pub fn temp_link_path(link: &Path) -> PathBuf {
    let name = link
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    link.with_file_name(format!(".{}{}", name, TEMP_LINK_SUFFIX))
}

/// The link a temporary sibling stands in for, if `path` is one
pub fn temp_link_owner(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    let owner = name.strip_prefix('.')?.strip_suffix(TEMP_LINK_SUFFIX)?;
    if owner.is_empty() {
        return None;
    }
    Some(path.with_file_name(owner))
}
