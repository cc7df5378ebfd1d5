// ABOUTME: Application-wide error types for boxctl.
// ABOUTME: Uses thiserror; ErrorKind gives callers a stable value to match on.

use crate::mount::MountSpecError;
use crate::ports::PortSpecError;
use crate::sshfs::{MountError, ReleaseFailure};
use nonempty::NonEmpty;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed mount spec '{token}': {source}")]
    MalformedMountSpec {
        token: String,
        #[source]
        source: MountSpecError,
    },

    #[error("mount conflict: {first} and {second} both map to {container_path}")]
    MountConflict {
        container_path: String,
        first: String,
        second: String,
    },

    #[error("failed to mount {endpoint}: {reason}")]
    MountFailed { endpoint: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("a configuration named '{0}' already exists (use --force to overwrite)")]
    DuplicateName(String),

    #[error("no configuration named '{0}'")]
    NotFound(String),

    #[error("configuration store {path} is corrupted: {reason}")]
    StoreCorrupted { path: PathBuf, reason: String },

    #[error("invalid port spec '{spec}': {source}")]
    PortSpecInvalid {
        spec: String,
        #[source]
        source: PortSpecError,
    },

    #[error("{} mount(s) could not be released", .0.len())]
    CleanupIncomplete(NonEmpty<ReleaseFailure>),

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("interrupted")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedMountSpec,
    MountConflict,
    MountFailed,
    Configuration,
    DuplicateName,
    NotFound,
    StoreCorrupted,
    PortSpecInvalid,
    CleanupIncomplete,
    Runtime,
    Interrupted,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedMountSpec { .. } => ErrorKind::MalformedMountSpec,
            Error::MountConflict { .. } => ErrorKind::MountConflict,
            Error::MountFailed { .. } => ErrorKind::MountFailed,
            Error::Configuration(_) | Error::Yaml(_) => ErrorKind::Configuration,
            Error::DuplicateName(_) => ErrorKind::DuplicateName,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::StoreCorrupted { .. } => ErrorKind::StoreCorrupted,
            Error::PortSpecInvalid { .. } => ErrorKind::PortSpecInvalid,
            Error::CleanupIncomplete(_) => ErrorKind::CleanupIncomplete,
            Error::Runtime(_) => ErrorKind::Runtime,
            Error::Interrupted => ErrorKind::Interrupted,
            Error::Io(_) | Error::Json(_) => ErrorKind::Io,
        }
    }

    /// Errors raised before any resource (mount, network, image) is touched.
    pub fn is_parse_time(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedMountSpec | ErrorKind::PortSpecInvalid | ErrorKind::Configuration
        )
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }
}

impl From<MountError> for Error {
    fn from(err: MountError) -> Self {
        match err {
            MountError::Io(e) => Error::Io(e),
            other => Error::MountFailed {
                endpoint: other.target().to_string(),
                reason: other.reason(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn mount_timeout_maps_to_mount_failed() {
        let err: Error = MountError::Timeout {
            target: "dev@build:/srv".to_string(),
            after: Duration::from_secs(15),
        }
        .into();

        assert_eq!(err.kind(), ErrorKind::MountFailed);
        assert!(err.to_string().contains("dev@build:/srv"));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn parse_time_errors_are_flagged() {
        assert!(Error::config("two network modes").is_parse_time());
        assert!(!Error::NotFound("x".into()).is_parse_time());
        assert!(
            !Error::MountFailed {
                endpoint: "a@b:/c".into(),
                reason: "denied".into()
            }
            .is_parse_time()
        );
    }
}
