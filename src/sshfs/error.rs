// ABOUTME: Error types for SSHFS mount and unmount operations.
// ABOUTME: Each variant carries the endpoint or mountpoint it concerns.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("sshfs is not installed (needed to mount {target})")]
    SshfsMissing { target: String },

    #[error("mounting {target} failed: {reason}")]
    Failed { target: String, reason: String },

    #[error("mounting {target} timed out after {}s", .after.as_secs())]
    Timeout { target: String, after: Duration },

    #[error("unmounting {target} failed: {reason}")]
    Unmount { target: String, reason: String },

    #[error("ssh mount cache lock: {0}")]
    Lock(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MountError {
    /// The endpoint or mountpoint the failure is about.
    pub fn target(&self) -> &str {
        match self {
            MountError::SshfsMissing { target }
            | MountError::Failed { target, .. }
            | MountError::Timeout { target, .. }
            | MountError::Unmount { target, .. } => target,
            MountError::Lock(_) => "ssh mount cache",
            MountError::Io(_) => "local mountpoint",
        }
    }

    /// Human readable cause without the target.
    pub fn reason(&self) -> String {
        match self {
            MountError::SshfsMissing { .. } => "sshfs is not installed".to_string(),
            MountError::Failed { reason, .. } | MountError::Unmount { reason, .. } => {
                reason.clone()
            }
            MountError::Timeout { after, .. } => {
                format!("timed out after {}s", after.as_secs())
            }
            MountError::Lock(message) => message.clone(),
            MountError::Io(e) => e.to_string(),
        }
    }
}

/// One mount that a cleanup sweep could not release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseFailure {
    pub mountpoint: PathBuf,
    pub error: String,
}

impl ReleaseFailure {
    pub fn new(mountpoint: impl Into<PathBuf>, error: &MountError) -> Self {
        Self {
            mountpoint: mountpoint.into(),
            error: error.to_string(),
        }
    }
}

impl fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.mountpoint.display(), self.error)
    }
}
