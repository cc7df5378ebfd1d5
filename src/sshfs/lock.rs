// ABOUTME: Advisory file lock on the ssh mount cache root.
// ABOUTME: Serializes check-then-mount and unmount across boxctl processes.

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::MountError;

const LOCK_FILE: &str = ".lock";
const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Who holds the cache lock, written into the lock file once acquired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl LockInfo {
    pub fn current() -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }
}

/// A held lock on the cache root. Released on drop.
pub struct CacheLock {
    flock: Flock<File>,
    path: PathBuf,
}

impl std::fmt::Debug for CacheLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLock")
            .field("path", &self.path)
            .finish()
    }
}

impl CacheLock {
    /// Acquire the lock, retrying until `timeout` elapses.
    ///
    /// The kernel drops a `flock` when its holder dies, so a crashed process
    /// never leaves the cache locked.
    pub async fn acquire(cache_root: &Path, timeout: Duration) -> Result<Self, MountError> {
        fs::create_dir_all(cache_root)?;
        let path = cache_root.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .mode(0o600)
            .open(&path)?;

        let deadline = Instant::now() + timeout;
        loop {
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(flock) => {
                    let lock = Self { flock, path };
                    lock.record_holder();
                    return Ok(lock);
                }
                Err((returned, errno)) if errno == Errno::EWOULDBLOCK => {
                    if Instant::now() >= deadline {
                        return Err(MountError::Lock(Self::held_message(&returned, timeout)));
                    }
                    tracing::debug!("ssh mount cache is locked, retrying");
                    file = returned;
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err((_, errno)) => {
                    return Err(MountError::Lock(format!(
                        "failed to lock {}: {errno}",
                        path.display()
                    )));
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_holder(&self) {
        let Ok(json) = serde_json::to_vec(&LockInfo::current()) else {
            return;
        };
        let mut file: &File = &self.flock;
        let written = file
            .set_len(0)
            .and_then(|_| file.rewind())
            .and_then(|_| file.write_all(&json));
        if let Err(e) = written {
            tracing::debug!("could not record lock holder: {}", e);
        }
    }

    fn held_message(mut file: &File, timeout: Duration) -> String {
        let mut content = String::new();
        let holder = file
            .rewind()
            .and_then(|_| file.read_to_string(&mut content))
            .ok()
            .and_then(|_| serde_json::from_str::<LockInfo>(&content).ok());
        match holder {
            Some(info) => format!(
                "held by {} (pid {}) since {}, gave up after {}s",
                info.holder,
                info.pid,
                info.started_at,
                timeout.as_secs()
            ),
            None => format!("held by another process, gave up after {}s", timeout.as_secs()),
        }
    }
}
