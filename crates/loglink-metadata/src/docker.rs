//! Read-only view of the Docker runtime root

use loglink_core::{constants, Result, VolumeMount};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Subset of `config.v2.json` we care about
#[derive(Debug, Deserialize, Default)]
struct DockerConfig {
    /// Absent in configs that predate it; empty when the logging driver
    /// writes no file
    #[serde(rename = "LogPath", default)]
    log_path: Option<String>,
    /// Keyed by destination, so iteration order is deterministic
    #[serde(rename = "MountPoints", default)]
    mount_points: BTreeMap<String, DockerMountPoint>,
}

#[derive(Debug, Deserialize)]
struct DockerMountPoint {
    #[serde(rename = "Source", default)]
    source: String,
    #[serde(rename = "Destination", default)]
    destination: String,
    #[serde(rename = "Name", default)]
    name: String,
}

/// What the runtime root tells us about one container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeInfo {
    /// `None` until the log file exists on disk
    pub stdout_log: Option<PathBuf>,
    /// Set when the container has no stdout log file at all
    pub no_stdout_log: bool,
    pub mounts: Vec<VolumeMount>,
}

/// Reader over `{graph_dir}/containers/{id}`
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    graph_dir: PathBuf,
}

impl DockerRuntime {
    pub fn new(graph_dir: impl Into<PathBuf>) -> Self {
        Self {
            graph_dir: graph_dir.into(),
        }
    }


    /// Container ids are used as path components, reject anything else
    pub fn is_valid_id(id: &str) -> bool {
        !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
    }

    /// Inspect a container's runtime state. A container whose config has not
    /// been written yet is reported with no stdout log and no mounts. An
    /// empty `LogPath` means the logging driver keeps no file to link.
    pub fn inspect(&self, container_id: &str) -> Result<RuntimeInfo> {
        let config_path =
            constants::docker_container_dir(&self.graph_dir, container_id).join(constants::DOCKER_CONFIG_FILE);

        let config: DockerConfig = match std::fs::read_to_string(&config_path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No runtime config yet for {}", container_id);
                DockerConfig::default()
            }
            Err(e) => return Err(e.into()),
        };

        let mounts = config
            .mount_points
            .into_values()
            .filter(|m| !m.source.is_empty())
            .map(|m| VolumeMount::new(m.name, m.source, m.destination))
            .collect();

        let log_path = match config.log_path.as_deref() {
            None => constants::docker_stdout_log(&self.graph_dir, container_id),
            Some("") => {
                debug!("{} has no stdout log file", container_id);
                return Ok(RuntimeInfo {
                    stdout_log: None,
                    no_stdout_log: true,
                    mounts,
                });
            }
            Some(path) => PathBuf::from(path),
        };

        let stdout_log = if log_path.is_file() {
            Some(log_path)
        } else {
            debug!(
                "Stdout log of {} not visible yet at {}",
                container_id,
                log_path.display()
            );
            None
        };

        Ok(RuntimeInfo {
            stdout_log,
            no_stdout_log: false,
            mounts,
        })
    }
}

/// Files under `source` matching `files_pattern`, sorted
pub fn find_log_files(source: &Path, files_pattern: &str) -> Vec<PathBuf> {
    let escaped = glob::Pattern::escape(&source.to_string_lossy());
    let full = format!("{}/{}", escaped.trim_end_matches('/'), files_pattern);

    let paths = match glob::glob(&full) {
        Ok(paths) => paths,
        Err(e) => {
            warn!("Invalid log file pattern '{}': {}", full, e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("Skipping unreadable path while globbing: {}", e);
                None
            }
        })
        .filter(|p| p.is_file() && p.starts_with(source))
        .collect();

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(graph: &Path, id: &str, json: &str) -> PathBuf {
        let dir = constants::docker_container_dir(graph, id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(constants::DOCKER_CONFIG_FILE), json).unwrap();
        dir
    }

    #[test]
    fn test_inspect_reads_log_path_and_mounts() {
        let graph = TempDir::new().unwrap();
        let log = graph.path().join("custom.log");
        fs::write(&log, "").unwrap();

        let json = format!(
            r#"{{
                "LogPath": "{}",
                "MountPoints": {{
                    "/var/log/app": {{"Source": "/srv/rancher-logging-web", "Destination": "/var/log/app", "Name": "rancher-logging-web"}},
                    "/data": {{"Source": "/srv/data", "Destination": "/data", "Name": ""}}
                }}
            }}"#,
            log.display()
        );
        write_config(graph.path(), "abc", &json);

        let runtime = DockerRuntime::new(graph.path());
        let info = runtime.inspect("abc").unwrap();

        assert_eq!(info.stdout_log, Some(log));
        assert_eq!(info.mounts.len(), 2);
        // Sorted by destination
        assert_eq!(info.mounts[0].destination, Path::new("/data"));
        assert_eq!(info.mounts[1].name, "rancher-logging-web");
    }

    #[test]
    fn test_inspect_defaults_to_json_log() {
        let graph = TempDir::new().unwrap();
        let dir = write_config(graph.path(), "abc", "{}");
        fs::write(dir.join("abc-json.log"), "").unwrap();

        let info = DockerRuntime::new(graph.path()).inspect("abc").unwrap();
        assert_eq!(info.stdout_log, Some(dir.join("abc-json.log")));
        assert!(info.mounts.is_empty());
    }

    #[test]
    fn test_inspect_log_not_visible_yet() {
        let graph = TempDir::new().unwrap();
        write_config(graph.path(), "abc", "{}");

        let info = DockerRuntime::new(graph.path()).inspect("abc").unwrap();
        assert!(info.stdout_log.is_none());
    }

    #[test]
    fn test_inspect_non_file_log_driver() {
        let graph = TempDir::new().unwrap();
        let dir = write_config(
            graph.path(),
            "abc",
            r#"{"LogPath": "", "MountPoints": {"/data": {"Source": "/srv/data", "Destination": "/data"}}}"#,
        );
        // A stray json log does not matter once the driver says there is none
        fs::write(dir.join("abc-json.log"), "").unwrap();

        let info = DockerRuntime::new(graph.path()).inspect("abc").unwrap();
        assert!(info.stdout_log.is_none());
        assert!(info.no_stdout_log);
        assert_eq!(info.mounts.len(), 1);
    }

    #[test]
    fn test_inspect_missing_log_path_file_is_pending() {
        let graph = TempDir::new().unwrap();
        let json = format!(r#"{{"LogPath": "{}"}}"#, graph.path().join("later.log").display());
        write_config(graph.path(), "abc", &json);

        let info = DockerRuntime::new(graph.path()).inspect("abc").unwrap();
        assert!(info.stdout_log.is_none());
        assert!(!info.no_stdout_log);
    }

    #[test]
    fn test_inspect_missing_container() {
        let graph = TempDir::new().unwrap();
        let info = DockerRuntime::new(graph.path()).inspect("nothere").unwrap();
        assert_eq!(info, RuntimeInfo::default());
    }

    #[test]
    fn test_inspect_corrupt_config() {
        let graph = TempDir::new().unwrap();
        write_config(graph.path(), "abc", "{not json");
        assert!(DockerRuntime::new(graph.path()).inspect("abc").is_err());
    }

    #[test]
    fn test_valid_id() {
        assert!(DockerRuntime::is_valid_id("abc123"));
        assert!(!DockerRuntime::is_valid_id(""));
        assert!(!DockerRuntime::is_valid_id("../etc"));
    }

    #[test]
    fn test_find_log_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.log"), "").unwrap();
        fs::write(dir.path().join("a.log"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("sub.log")).unwrap();

        let files = find_log_files(dir.path(), "*.log");
        assert_eq!(files, vec![dir.path().join("a.log"), dir.path().join("b.log")]);
    }

    #[test]
    fn test_find_log_files_none_match() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        assert!(find_log_files(dir.path(), "*.log").is_empty());
    }
}
