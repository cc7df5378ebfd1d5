// ABOUTME: SSHFS lifecycle: mount remote directories over SSH and tear them down.
// ABOUTME: Mounts live under a temp-rooted cache directory shared by all boxctl processes.

mod error;
mod lock;
mod manager;
mod mounter;
mod naming;
mod record;

pub use error::{MountError, ReleaseFailure};
pub use lock::{CacheLock, LockInfo};
pub use manager::{MountTimeouts, ReleaseReport, SshMountHandle, SshMountManager};
pub use mounter::{
    MountRequest, Mounter, SshfsMounter, mount_table_contains, process_alive, sshfs_options,
};
pub use naming::{CUSTOM_PREFIX, custom_mount_name, mount_name};
pub use record::{ActiveSshMount, MountState};

use std::path::PathBuf;

/// Default cache root: `<tmp>/boxctl-<uid>/ssh-mounts`.
pub fn default_cache_root() -> PathBuf {
    std::env::temp_dir()
        .join(format!("boxctl-{}", nix::unistd::getuid()))
        .join("ssh-mounts")
}
