//! CLI argument definitions

use clap::Parser;
use loglink_core::{ConfigFile, Result, Settings};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "loglinkd")]
#[command(
    version,
    about = "Keeps per-container log symlinks in step with Rancher metadata"
)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, env = "DEBUG")]
    pub debug: bool,

    /// Address of the Rancher metadata service
    #[arg(long, value_name = "HOST[:PORT]")]
    pub metadata_address: Option<String>,

    /// Port of the healthcheck endpoint
    #[arg(long)]
    pub health_check_port: Option<u16>,

    /// Docker graph directory
    #[arg(long, env = "DOCKER_GRAPH_DIR")]
    pub docker_graph_dir: Option<PathBuf>,

    /// Directory receiving container stdout log links
    #[arg(long, env = "LOG_CNT_DIR")]
    pub logging_containers_dir: Option<PathBuf>,

    /// Directory receiving custom log volume links
    #[arg(long, env = "LOG_VOL_DIR")]
    pub logging_volumes_dir: Option<PathBuf>,

    /// Glob identifying log volumes by name or host path
    #[arg(long, env = "LOG_VOL_PATTERN")]
    pub logging_volumes_pattern: Option<String>,

    /// Glob selecting log files inside log volumes
    #[arg(long, env = "LOG_FILE_PATTERN")]
    pub logging_files_pattern: Option<String>,

    /// How often the metadata version is checked, in milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Full resync period in seconds
    #[arg(long)]
    pub resync_interval_secs: Option<u64>,

    /// Do not watch the managed roots for external changes
    #[arg(long)]
    pub no_watch: bool,

    /// Config file (.toml, .yaml, .yml or .json)
    #[arg(short, long, env = "LOGLINK_CONFIG")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Layer defaults, the config file, then flags and environment
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::default();

        if let Some(path) = &self.config {
            ConfigFile::load(path)?.apply_to(&mut settings);
        }

        if self.debug {
            settings.debug = true;
        }
        if self.no_watch {
            settings.watch_roots = false;
        }
        if let Some(address) = &self.metadata_address {
            settings.metadata_address = address.clone();
        }
        if let Some(port) = self.health_check_port {
            settings.health_check_port = port;
        }
        if let Some(dir) = &self.docker_graph_dir {
            settings.docker_graph_dir = dir.clone();
        }
        if let Some(dir) = &self.logging_containers_dir {
            settings.logging_containers_dir = dir.clone();
        }
        if let Some(dir) = &self.logging_volumes_dir {
            settings.logging_volumes_dir = dir.clone();
        }
        if let Some(pattern) = &self.logging_volumes_pattern {
            settings.logging_volumes_pattern = pattern.clone();
        }
        if let Some(pattern) = &self.logging_files_pattern {
            settings.logging_files_pattern = pattern.clone();
        }
        if let Some(ms) = self.poll_interval_ms {
            settings.poll_interval_ms = ms;
        }
        if let Some(secs) = self.resync_interval_secs {
            settings.resync_interval_secs = secs;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loglink_core::Error;
    use std::io::Write;
    use std::path::Path;
    use tempfile::Builder;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["loglinkd"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&[]).settings().unwrap();
        assert_eq!(settings.metadata_address, "rancher-metadata.rancher.internal");
        assert_eq!(settings.health_check_port, 9898);
        assert_eq!(settings.logging_volumes_pattern, "rancher-logging*");
    }

    #[test]
    fn test_flags_override() {
        let cli = parse(&[
            "--metadata-address",
            "169.254.169.250",
            "--health-check-port",
            "9000",
            "--logging-containers-dir",
            "/logs/c",
            "--logging-volumes-dir",
            "/logs/v",
            "--no-watch",
        ]);
        let settings = cli.settings().unwrap();

        assert_eq!(settings.metadata_address, "169.254.169.250");
        assert_eq!(settings.health_check_port, 9000);
        assert_eq!(settings.logging_containers_dir, Path::new("/logs/c"));
        assert_eq!(settings.logging_volumes_dir, Path::new("/logs/v"));
        assert!(!settings.watch_roots);
    }

    #[test]
    fn test_flags_beat_config_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "health_check_port = 7000").unwrap();
        writeln!(file, "logging_files_pattern = \"*.txt\"").unwrap();

        let cli = parse(&[
            "--config",
            file.path().to_str().unwrap(),
            "--health-check-port",
            "7001",
        ]);
        let settings = cli.settings().unwrap();

        assert_eq!(settings.health_check_port, 7001);
        assert_eq!(settings.logging_files_pattern, "*.txt");
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let cli = parse(&["--logging-containers-dir", "relative/dir"]);
        assert!(matches!(cli.settings(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_missing_config_file() {
        let cli = parse(&["--config", "/nonexistent/loglink.toml"]);
        assert!(matches!(cli.settings(), Err(Error::ConfigNotFound(_))));
    }
}
