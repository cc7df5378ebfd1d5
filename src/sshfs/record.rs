// ABOUTME: On-disk record of an SSHFS mount, stored next to its mountpoint.
// ABOUTME: The cache root plus these records let other processes find live mounts.

use crate::mount::{MountMode, RemoteEndpoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Lifecycle of one remote mount request.
///
/// Only `Mounting`, `Active` and `Unmounting` are ever written to disk; the
/// terminal states are reported in logs and then the record is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountState {
    Requested,
    Mounting,
    Active,
    Unmounting,
    Released,
    Failed,
}

impl std::fmt::Display for MountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MountState::Requested => "requested",
            MountState::Mounting => "mounting",
            MountState::Active => "active",
            MountState::Unmounting => "unmounting",
            MountState::Released => "released",
            MountState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A live SSHFS mount backing one remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSshMount {
    /// Registry name, also the file stem of the record.
    pub name: String,
    pub endpoint: RemoteEndpoint,
    pub local_mountpoint: PathBuf,
    pub mode: MountMode,
    /// Process id of the sshfs process; 0 until the mount is up.
    pub pid: u32,
    pub state: MountState,
    /// Hostname of the machine that created the mount.
    pub holder: String,
    /// Processes currently holding leases on this mount.
    #[serde(default)]
    pub owners: Vec<u32>,
    /// Survives its owners (standalone `mount --detach`).
    #[serde(default)]
    pub persistent: bool,
    pub created_at: DateTime<Utc>,
}

impl ActiveSshMount {
    pub fn new(
        name: impl Into<String>,
        endpoint: RemoteEndpoint,
        local_mountpoint: impl Into<PathBuf>,
        mode: MountMode,
        persistent: bool,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint,
            local_mountpoint: local_mountpoint.into(),
            mode,
            pid: 0,
            state: MountState::Requested,
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            owners: vec![std::process::id()],
            persistent,
            created_at: Utc::now(),
        }
    }

    /// Path of the record for `name` under `cache_root`.
    pub fn record_path(cache_root: &Path, name: &str) -> PathBuf {
        cache_root.join(format!("{name}.json"))
    }

    /// Path of the sshfs stderr log for `name` under `cache_root`.
    pub fn log_path(cache_root: &Path, name: &str) -> PathBuf {
        cache_root.join(format!("{name}.log"))
    }

    /// Read a record. A missing file is `Ok(None)`.
    pub fn load(path: &Path) -> io::Result<Option<Self>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Write the record through a temp file and rename.
    pub fn save(&self, cache_root: &Path) -> io::Result<()> {
        let path = Self::record_path(cache_root, &self.name);
        let tmp = cache_root.join(format!(".{}.json.tmp", self.name));
        let json = serde_json::to_vec_pretty(self).map_err(io::Error::other)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)
    }

    /// Remove the record and the sshfs log. Missing files are ignored.
    pub fn remove(cache_root: &Path, name: &str) -> io::Result<()> {
        for path in [
            Self::record_path(cache_root, name),
            Self::log_path(cache_root, name),
        ] {
            match fs::remove_file(&path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }

    /// Whether the mountpoint directory is owned by the cache root.
    pub fn is_managed_dir(&self, cache_root: &Path) -> bool {
        self.local_mountpoint.starts_with(cache_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample(name: &str) -> ActiveSshMount {
        ActiveSshMount::new(
            name,
            RemoteEndpoint {
                user: "dev".into(),
                host: "build".into(),
                path: "/srv".into(),
            },
            format!("/tmp/cache/{name}"),
            MountMode::ReadOnly,
            false,
        )
    }

    #[test]
    fn new_record_is_owned_by_current_process() {
        let record = sample("ro-dev@build+_srv");
        assert_eq!(record.owners, vec![std::process::id()]);
        assert_eq!(record.state, MountState::Requested);
        assert!(!record.holder.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut record = sample("ro-dev@build+_srv");
        record.state = MountState::Active;
        record.pid = 4242;
        record.save(dir.path()).unwrap();

        let path = ActiveSshMount::record_path(dir.path(), &record.name);
        assert_eq!(ActiveSshMount::load(&path).unwrap(), Some(record));
    }

    #[test]
    fn missing_record_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = ActiveSshMount::record_path(dir.path(), "nope");
        assert!(ActiveSshMount::load(&path).unwrap().is_none());
    }

    #[test]
    fn corrupted_record_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = ActiveSshMount::record_path(dir.path(), "bad");
        fs::write(&path, "{not json").unwrap();
        let err = ActiveSshMount::load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn remove_ignores_missing_files() {
        let dir = TempDir::new().unwrap();
        let record = sample("x");
        record.save(dir.path()).unwrap();
        ActiveSshMount::remove(dir.path(), "x").unwrap();
        ActiveSshMount::remove(dir.path(), "x").unwrap();
        assert!(!ActiveSshMount::record_path(dir.path(), "x").exists());
    }
}
