//! Error types for loglink

use std::path::PathBuf;

/// loglink error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transient metadata fetch error: {0}")]
    TransientFetch(String),

    #[error("Metadata protocol error: {0}")]
    FatalProtocol(String),

    #[error("Duplicate container id in snapshot: {0}")]
    DuplicateContainer(String),

    #[error("Failed to apply {path}: {reason}")]
    PlanApply { path: PathBuf, reason: String },

    #[error("Managed root is not writable: {0}")]
    RootUnwritable(PathBuf),

    #[error("Managed root {path} is not accessible: {reason}")]
    RootInaccessible { path: PathBuf, reason: String },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for loglink
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn transient<S: Into<String>>(msg: S) -> Self {
        Error::TransientFetch(msg.into())
    }

    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        Error::FatalProtocol(msg.into())
    }

    /// Errors the loop retries with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientFetch(_))
    }

    /// Errors that stop the reconciliation loop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FatalProtocol(_)
                | Error::DuplicateContainer(_)
                | Error::RootUnwritable(_)
                | Error::RootInaccessible { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::RootUnwritable(PathBuf::from("/var/log/logging-containers"));
        assert_eq!(
            err.to_string(),
            "Managed root is not writable: /var/log/logging-containers"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::transient("timeout").is_transient());
        assert!(!Error::transient("timeout").is_fatal());
        assert!(Error::protocol("404").is_fatal());
        assert!(Error::RootUnwritable(PathBuf::from("/x")).is_fatal());
        let apply = Error::PlanApply {
            path: PathBuf::from("/x/y"),
            reason: "denied".to_string(),
        };
        assert!(!apply.is_fatal());
        assert!(!apply.is_transient());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
    }
}
