// ABOUTME: Registry of SSHFS mounts: acquire, release, sweep and inspect.
// ABOUTME: The cache root on disk is the source of truth shared between processes.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::lock::CacheLock;
use super::mounter::{MountRequest, Mounter, process_alive};
use super::naming::{custom_mount_name, mount_name};
use super::record::{ActiveSshMount, MountState};
use super::{MountError, ReleaseFailure};
use crate::error::{Error, Result};
use crate::mount::{MountMode, RemoteEndpoint};

/// Bounds on the blocking steps of the mount lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountTimeouts {
    pub mount: Duration,
    pub unmount: Duration,
    pub lock: Duration,
}

impl Default for MountTimeouts {
    fn default() -> Self {
        Self {
            mount: Duration::from_secs(15),
            unmount: Duration::from_secs(10),
            lock: Duration::from_secs(30),
        }
    }
}

/// A lease on an active mount. Release it through the manager that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SshMountHandle {
    lease: u64,
    name: String,
    mountpoint: PathBuf,
    endpoint: RemoteEndpoint,
    mode: MountMode,
}

impl SshMountHandle {
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    pub fn mode(&self) -> MountMode {
        self.mode
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of a best-effort teardown over several mounts.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReleaseReport {
    pub released: Vec<PathBuf>,
    pub failed: Vec<ReleaseFailure>,
}

impl ReleaseReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn collected failures into `Error::CleanupIncomplete`.
    pub fn into_result(self) -> Result<Vec<PathBuf>> {
        match nonempty::NonEmpty::from_vec(self.failed) {
            Some(failed) => Err(Error::CleanupIncomplete(failed)),
            None => Ok(self.released),
        }
    }
}

struct Entry {
    record: ActiveSshMount,
    leases: BTreeSet<u64>,
    /// Creation sequence within this process.
    seq: u64,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: HashMap<String, Entry>,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Cleans up after a mount that never finished because the acquiring future
/// was dropped mid-mount.
struct PendingMount<'a> {
    cache_root: &'a Path,
    name: &'a str,
    mountpoint: &'a Path,
    managed: bool,
    armed: bool,
}

impl PendingMount<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingMount<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!("abandoned mount at {}", self.mountpoint.display());
        if let Err(e) = ActiveSshMount::remove(self.cache_root, self.name) {
            tracing::warn!("could not remove mount record {}: {}", self.name, e);
        }
        if self.managed
            && let Err(e) = fs::remove_dir(self.mountpoint)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!("could not remove {}: {}", self.mountpoint.display(), e);
        }
    }
}

/// Creates, shares and tears down SSHFS mounts under one cache root.
///
/// Within a process, identical (endpoint, mode) requests share one mount via
/// leases. Across processes, an advisory lock on the cache root makes
/// "is it mounted already" and "mount it" one step.
pub struct SshMountManager {
    cache_root: PathBuf,
    mounter: Arc<dyn Mounter>,
    timeouts: MountTimeouts,
    gate: tokio::sync::Mutex<()>,
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for SshMountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshMountManager")
            .field("cache_root", &self.cache_root)
            .field("timeouts", &self.timeouts)
            .field("leased", &self.registry.lock().entries.len())
            .finish()
    }
}

impl SshMountManager {
    pub fn new(
        cache_root: impl Into<PathBuf>,
        mounter: Arc<dyn Mounter>,
        timeouts: MountTimeouts,
    ) -> Self {
        Self {
            cache_root: cache_root.into(),
            mounter,
            timeouts,
            gate: tokio::sync::Mutex::new(()),
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    /// Mount `endpoint` under the cache root, or lease the existing mount.
    pub async fn acquire(
        &self,
        endpoint: &RemoteEndpoint,
        mode: MountMode,
    ) -> std::result::Result<SshMountHandle, MountError> {
        let name = mount_name(endpoint, mode);
        let mountpoint = self.cache_root.join(&name);
        self.acquire_named(name, endpoint, mode, mountpoint, false)
            .await
    }

    /// Mount `endpoint` at a caller chosen path. A persistent mount outlives
    /// this process and is only removed by an explicit unmount or sweep.
    pub async fn acquire_at(
        &self,
        endpoint: &RemoteEndpoint,
        mode: MountMode,
        mountpoint: &Path,
        persistent: bool,
    ) -> std::result::Result<SshMountHandle, MountError> {
        let name = custom_mount_name(mountpoint);
        self.acquire_named(name, endpoint, mode, mountpoint.to_path_buf(), persistent)
            .await
    }

    async fn acquire_named(
        &self,
        name: String,
        endpoint: &RemoteEndpoint,
        mode: MountMode,
        mountpoint: PathBuf,
        persistent: bool,
    ) -> std::result::Result<SshMountHandle, MountError> {
        let _gate = self.gate.lock().await;

        if let Some(handle) = self.lease_existing(&name) {
            tracing::debug!("reusing mount of {} at {}", endpoint, mountpoint.display());
            return Ok(handle);
        }

        let _lock = CacheLock::acquire(&self.cache_root, self.timeouts.lock).await?;

        let record_path = ActiveSshMount::record_path(&self.cache_root, &name);
        match ActiveSshMount::load(&record_path) {
            Ok(Some(mut existing)) => {
                if existing.endpoint == *endpoint && self.is_live(&existing) {
                    existing.owners.retain(|pid| process_alive(*pid));
                    existing.owners.push(std::process::id());
                    existing.persistent |= persistent;
                    existing.save(&self.cache_root)?;
                    tracing::debug!(
                        "adopting mount of {} held by pid(s) {:?}",
                        endpoint,
                        existing.owners
                    );
                    return Ok(self.register(existing));
                }
                tracing::warn!(
                    "reclaiming stale mount {} ({})",
                    existing.local_mountpoint.display(),
                    existing.endpoint
                );
                self.teardown(existing).await?;
            }
            Ok(None) => {
                if self.mounter.is_mounted(&mountpoint) {
                    return Err(MountError::Failed {
                        target: endpoint.to_string(),
                        reason: format!(
                            "{} is already a mountpoint not managed by boxctl",
                            mountpoint.display()
                        ),
                    });
                }
            }
            Err(e) => {
                tracing::warn!("discarding unreadable mount record {}: {}", name, e);
                ActiveSshMount::remove(&self.cache_root, &name)?;
            }
        }

        self.mount_new(name, endpoint, mode, mountpoint, persistent)
            .await
    }

    async fn mount_new(
        &self,
        name: String,
        endpoint: &RemoteEndpoint,
        mode: MountMode,
        mountpoint: PathBuf,
        persistent: bool,
    ) -> std::result::Result<SshMountHandle, MountError> {
        fs::create_dir_all(&mountpoint)?;
        let pending = PendingMount {
            cache_root: &self.cache_root,
            name: &name,
            mountpoint: &mountpoint,
            managed: mountpoint.starts_with(&self.cache_root),
            armed: true,
        };

        let mut record = ActiveSshMount::new(&name, endpoint.clone(), &mountpoint, mode, persistent);
        record.state = MountState::Mounting;
        record.save(&self.cache_root)?;

        let log_path = ActiveSshMount::log_path(&self.cache_root, &name);
        let request = MountRequest {
            endpoint,
            mountpoint: &mountpoint,
            mode,
            log_path: &log_path,
        };

        let outcome = tokio::time::timeout(self.timeouts.mount, self.mounter.mount(&request)).await;
        let result = match outcome {
            Ok(Ok(pid)) => Ok(pid),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MountError::Timeout {
                target: endpoint.to_string(),
                after: self.timeouts.mount,
            }),
        };

        match result {
            Ok(pid) => {
                pending.disarm();
                record.pid = pid;
                record.state = MountState::Active;
                record.save(&self.cache_root)?;
                tracing::debug!(
                    "mounted {} at {} (pid {})",
                    endpoint,
                    mountpoint.display(),
                    pid
                );
                Ok(self.register(record))
            }
            Err(e) => {
                tracing::debug!("mount of {} {}: {}", endpoint, MountState::Failed, e);
                if let Err(cleanup) = self.remove_leftovers(&record).await {
                    tracing::warn!(
                        "could not clean up failed mount {}: {}",
                        mountpoint.display(),
                        cleanup
                    );
                }
                pending.disarm();
                Err(e)
            }
        }
    }

    /// Release one lease. The mount is torn down once no lease and no other
    /// live owner remains. Releasing an already released handle is a no-op.
    pub async fn release(&self, handle: &SshMountHandle) -> std::result::Result<(), MountError> {
        let _gate = self.gate.lock().await;

        let entry = {
            let mut registry = self.registry.lock();
            let Some(entry) = registry.entries.get_mut(&handle.name) else {
                return Ok(());
            };
            if !entry.leases.remove(&handle.lease) || !entry.leases.is_empty() {
                return Ok(());
            }
            registry.entries.remove(&handle.name)
        };
        let Some(entry) = entry else {
            return Ok(());
        };

        let result = match CacheLock::acquire(&self.cache_root, self.timeouts.lock).await {
            Ok(_lock) => self.drop_ownership(entry.record.clone()).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            // keep the lease so the handle can be released again
            let mut entry = entry;
            entry.leases.insert(handle.lease);
            self.registry.lock().entries.insert(handle.name.clone(), entry);
        }
        result
    }

    /// Release handles from one run, newest first.
    pub async fn release_handles(&self, handles: &[SshMountHandle]) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        for handle in handles.iter().rev() {
            match self.release(handle).await {
                Ok(()) => report.released.push(handle.mountpoint.clone()),
                Err(e) => {
                    tracing::warn!("failed to release {}: {}", handle.mountpoint.display(), e);
                    report
                        .failed
                        .push(ReleaseFailure::new(&handle.mountpoint, &e));
                }
            }
        }
        report
    }

    /// Drop every lease this process holds, newest mount first.
    pub async fn release_session(&self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        let _gate = self.gate.lock().await;

        let mut records: Vec<(u64, ActiveSshMount)> = self
            .registry
            .lock()
            .entries
            .drain()
            .map(|(_, entry)| (entry.seq, entry.record))
            .collect();
        if records.is_empty() {
            return report;
        }
        records.sort_by(|a, b| b.0.cmp(&a.0));

        let _lock = match CacheLock::acquire(&self.cache_root, self.timeouts.lock).await {
            Ok(lock) => lock,
            Err(e) => {
                for (_, record) in records {
                    report
                        .failed
                        .push(ReleaseFailure::new(&record.local_mountpoint, &e));
                }
                return report;
            }
        };

        for (_, record) in records {
            let mountpoint = record.local_mountpoint.clone();
            match self.drop_ownership(record).await {
                Ok(()) => report.released.push(mountpoint),
                Err(e) => report.failed.push(ReleaseFailure::new(mountpoint, &e)),
            }
        }
        report
    }

    /// Tear down every mount under the cache root, including those left by
    /// crashed processes and those held by other live processes.
    ///
    /// Never fails as a whole; individual failures are collected.
    pub async fn release_all(&self) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        let _gate = self.gate.lock().await;

        let mut in_memory: Vec<(u64, ActiveSshMount)> = self
            .registry
            .lock()
            .entries
            .drain()
            .map(|(_, entry)| (entry.seq, entry.record))
            .collect();
        in_memory.sort_by(|a, b| b.0.cmp(&a.0));

        if !self.cache_root.exists() {
            return report;
        }

        let _lock = match CacheLock::acquire(&self.cache_root, self.timeouts.lock).await {
            Ok(lock) => lock,
            Err(e) => {
                report
                    .failed
                    .push(ReleaseFailure::new(&self.cache_root, &e));
                return report;
            }
        };

        let mut seen = HashSet::new();
        let mut records: Vec<ActiveSshMount> =
            in_memory.into_iter().map(|(_, record)| record).collect();
        let (on_disk, unreadable) = self.scan_records();
        let mut on_disk: Vec<ActiveSshMount> = on_disk
            .into_iter()
            .filter(|r| !records.iter().any(|m| m.name == r.name))
            .collect();
        on_disk.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.extend(on_disk);

        for record in records {
            seen.insert(record.name.clone());
            let mountpoint = record.local_mountpoint.clone();
            match self.teardown(record).await {
                Ok(()) => report.released.push(mountpoint),
                Err(e) => {
                    tracing::warn!("failed to release {}: {}", mountpoint.display(), e);
                    report.failed.push(ReleaseFailure::new(mountpoint, &e));
                }
            }
        }

        for name in unreadable {
            if let Err(e) = ActiveSshMount::remove(&self.cache_root, &name) {
                report
                    .failed
                    .push(ReleaseFailure::new(self.cache_root.join(&name), &e.into()));
            }
        }

        // directories without a record: crashed before the record was written
        for dir in self.orphan_dirs(&seen) {
            match self.clear_mountpoint(&dir, true).await {
                Ok(()) => report.released.push(dir),
                Err(e) => report.failed.push(ReleaseFailure::new(dir, &e)),
            }
        }

        report
    }

    /// Tear down the mount at `local`, whoever owns it.
    /// Returns false when nothing boxctl knows of is mounted there.
    pub async fn release_path(&self, local: &Path) -> std::result::Result<bool, MountError> {
        let _gate = self.gate.lock().await;
        let _lock = CacheLock::acquire(&self.cache_root, self.timeouts.lock).await?;

        let (records, _) = self.scan_records();
        let Some(record) = records
            .into_iter()
            .find(|r| r.local_mountpoint == local || r.name == local.to_string_lossy())
        else {
            return Ok(false);
        };

        self.registry.lock().entries.remove(&record.name);
        self.teardown(record).await?;
        Ok(true)
    }

    /// Mounts that are up right now, oldest first.
    pub fn list_active(&self) -> Vec<ActiveSshMount> {
        let (mut records, _) = self.scan_records();
        records.retain(|r| r.state == MountState::Active && self.is_live(r));
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    /// Every mount record on disk, live or not.
    pub fn list_records(&self) -> Vec<ActiveSshMount> {
        let (mut records, _) = self.scan_records();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    /// Whether a record describes a mount that is still in use.
    pub fn is_live(&self, record: &ActiveSshMount) -> bool {
        self.mounter.is_alive(record.pid)
            && self.mounter.is_mounted(&record.local_mountpoint)
            && (record.persistent || record.owners.iter().any(|pid| process_alive(*pid)))
    }

    fn lease_existing(&self, name: &str) -> Option<SshMountHandle> {
        let mut registry = self.registry.lock();
        let lease = registry.next_id();
        let entry = registry.entries.get_mut(name)?;
        if !self.mounter.is_alive(entry.record.pid) {
            return None;
        }
        entry.leases.insert(lease);
        Some(handle_for(lease, &entry.record))
    }

    fn register(&self, record: ActiveSshMount) -> SshMountHandle {
        let mut registry = self.registry.lock();
        let lease = registry.next_id();
        let handle = handle_for(lease, &record);
        registry.entries.insert(
            record.name.clone(),
            Entry {
                record,
                leases: BTreeSet::from([lease]),
                seq: lease,
            },
        );
        handle
    }

    /// Remove this process from the owners; tear down if nobody is left.
    async fn drop_ownership(&self, record: ActiveSshMount) -> std::result::Result<(), MountError> {
        let me = std::process::id();
        let mut current = ActiveSshMount::load(&ActiveSshMount::record_path(
            &self.cache_root,
            &record.name,
        ))
        .ok()
        .flatten()
        .unwrap_or(record);

        current
            .owners
            .retain(|pid| *pid != me && process_alive(*pid));
        if current.persistent || !current.owners.is_empty() {
            tracing::debug!(
                "leaving {} mounted for pid(s) {:?}",
                current.local_mountpoint.display(),
                current.owners
            );
            current.save(&self.cache_root)?;
            return Ok(());
        }
        self.teardown(current).await
    }

    /// Unmount, stop the sshfs process, remove the mountpoint and record.
    async fn teardown(&self, mut record: ActiveSshMount) -> std::result::Result<(), MountError> {
        record.state = MountState::Unmounting;
        record.save(&self.cache_root)?;

        let managed = record.is_managed_dir(&self.cache_root);
        self.clear_mountpoint(&record.local_mountpoint, managed)
            .await?;
        if self.mounter.is_alive(record.pid) {
            self.mounter.terminate(record.pid);
        }
        ActiveSshMount::remove(&self.cache_root, &record.name)?;
        tracing::debug!(
            "{} {} at {}",
            MountState::Released,
            record.endpoint,
            record.local_mountpoint.display()
        );
        Ok(())
    }

    async fn remove_leftovers(&self, record: &ActiveSshMount) -> std::result::Result<(), MountError> {
        let managed = record.is_managed_dir(&self.cache_root);
        self.clear_mountpoint(&record.local_mountpoint, managed)
            .await?;
        ActiveSshMount::remove(&self.cache_root, &record.name)?;
        Ok(())
    }

    /// Unmount if mounted, then remove the directory when we own it. Only
    /// empty directories are removed, never remote contents.
    async fn clear_mountpoint(&self, dir: &Path, remove_dir: bool) -> std::result::Result<(), MountError> {
        if self.mounter.is_mounted(dir) {
            match tokio::time::timeout(self.timeouts.unmount, self.mounter.unmount(dir)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(MountError::Unmount {
                        target: dir.display().to_string(),
                        reason: format!("timed out after {}s", self.timeouts.unmount.as_secs()),
                    });
                }
            }
        }
        if remove_dir {
            match fs::remove_dir(dir) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
        Ok(())
    }

    /// Records under the cache root, plus names whose record is unreadable.
    fn scan_records(&self) -> (Vec<ActiveSshMount>, Vec<String>) {
        let mut records = Vec::new();
        let mut unreadable = Vec::new();
        let Ok(entries) = fs::read_dir(&self.cache_root) else {
            return (records, unreadable);
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            let Some(name) = file_name.strip_suffix(".json") else {
                continue;
            };
            match ActiveSshMount::load(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("unreadable mount record {}: {}", path.display(), e);
                    unreadable.push(name.to_string());
                }
            }
        }
        (records, unreadable)
    }

    fn orphan_dirs(&self, known: &HashSet<String>) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.cache_root) else {
            return Vec::new();
        };
        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.') && !known.contains(n))
            })
            .collect()
    }
}

fn handle_for(lease: u64, record: &ActiveSshMount) -> SshMountHandle {
    SshMountHandle {
        lease,
        name: record.name.clone(),
        mountpoint: record.local_mountpoint.clone(),
        endpoint: record.endpoint.clone(),
        mode: record.mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_timeouts() {
        let t = MountTimeouts::default();
        assert_eq!(t.mount, Duration::from_secs(15));
        assert_eq!(t.unmount, Duration::from_secs(10));
        assert_eq!(t.lock, Duration::from_secs(30));
    }

    #[test]
    fn report_with_failures_becomes_cleanup_incomplete() {
        let mut report = ReleaseReport::default();
        report.released.push(PathBuf::from("/tmp/a"));
        assert!(report.all_succeeded());

        report.failed.push(ReleaseFailure {
            mountpoint: PathBuf::from("/tmp/b"),
            error: "busy".into(),
        });
        assert!(!report.all_succeeded());

        let err = report.into_result().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CleanupIncomplete);
        assert_eq!(err.to_string(), "1 mount(s) could not be released");
    }

    #[test]
    fn clean_report_returns_released_paths() {
        let report = ReleaseReport {
            released: vec![PathBuf::from("/tmp/a")],
            failed: vec![],
        };
        assert_eq!(report.into_result().unwrap(), vec![PathBuf::from("/tmp/a")]);
    }
}
