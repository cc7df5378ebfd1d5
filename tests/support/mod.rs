// ABOUTME: Test support utilities.
// ABOUTME: Provides tracing setup plus fake Mounter and network runtime implementations.

// Each test binary only uses some of these items, so allow dead_code.
#![allow(dead_code)]

use async_trait::async_trait;
use boxctl::mount::{MountMode, ParseContext};
use boxctl::runtime::{NetworkConfig, NetworkError, NetworkOps};
use boxctl::sshfs::{MountError, MountRequest, MountTimeouts, Mounter, SshMountManager};
use boxctl::types::NetworkId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("boxctl=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Pids handed out by the fake mounter; far above any real pid.
const FAKE_PID_BASE: u32 = 900_000_000;

#[derive(Default)]
struct FakeState {
    next_pid: u32,
    mounted: HashMap<PathBuf, u32>,
    alive: HashSet<u32>,
    mount_calls: usize,
    unmounted: Vec<PathBuf>,
    fail_on: HashSet<String>,
    hang_on: HashSet<String>,
    busy: HashSet<PathBuf>,
}

/// In-memory stand-in for sshfs. Nothing touches the real filesystem
/// besides what the manager itself creates.
#[derive(Default)]
pub struct FakeMounter {
    state: Mutex<FakeState>,
}

impl FakeMounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make mounting `endpoint` (as `user@host:path`) fail.
    pub fn fail_on(&self, endpoint: &str) {
        self.state.lock().fail_on.insert(endpoint.to_string());
    }

    /// Make mounting `endpoint` never finish.
    pub fn hang_on(&self, endpoint: &str) {
        self.state.lock().hang_on.insert(endpoint.to_string());
    }

    /// Make unmounting `mountpoint` fail.
    pub fn busy(&self, mountpoint: &Path) {
        self.state.lock().busy.insert(mountpoint.to_path_buf());
    }

    /// Let unmounting `mountpoint` succeed again.
    pub fn idle(&self, mountpoint: &Path) {
        self.state.lock().busy.remove(mountpoint);
    }

    /// Simulate the mount process dying without unmounting.
    pub fn crash(&self, mountpoint: &Path) {
        let mut state = self.state.lock();
        if let Some(pid) = state.mounted.get(mountpoint).copied() {
            state.alive.remove(&pid);
        }
    }

    pub fn mount_calls(&self) -> usize {
        self.state.lock().mount_calls
    }

    pub fn unmounted(&self) -> Vec<PathBuf> {
        self.state.lock().unmounted.clone()
    }

    pub fn mounted_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.state.lock().mounted.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn is_mounted_at(&self, mountpoint: &Path) -> bool {
        self.state.lock().mounted.contains_key(mountpoint)
    }
}

#[async_trait]
impl Mounter for FakeMounter {
    async fn mount(&self, request: &MountRequest<'_>) -> Result<u32, MountError> {
        let target = request.endpoint.to_string();
        let hang = {
            let mut state = self.state.lock();
            state.mount_calls += 1;
            if state.fail_on.contains(&target) {
                return Err(MountError::Failed {
                    target,
                    reason: "connection refused".to_string(),
                });
            }
            state.hang_on.contains(&target)
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        state.next_pid += 1;
        let pid = FAKE_PID_BASE + state.next_pid;
        state.mounted.insert(request.mountpoint.to_path_buf(), pid);
        state.alive.insert(pid);
        Ok(pid)
    }

    async fn unmount(&self, mountpoint: &Path) -> Result<(), MountError> {
        let mut state = self.state.lock();
        if state.busy.contains(mountpoint) {
            return Err(MountError::Unmount {
                target: mountpoint.display().to_string(),
                reason: "device busy".to_string(),
            });
        }
        if let Some(pid) = state.mounted.remove(mountpoint) {
            state.alive.remove(&pid);
            state.unmounted.push(mountpoint.to_path_buf());
        }
        Ok(())
    }

    fn is_mounted(&self, mountpoint: &Path) -> bool {
        self.state.lock().mounted.contains_key(mountpoint)
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().alive.contains(&pid)
    }

    fn terminate(&self, pid: u32) {
        self.state.lock().alive.remove(&pid);
    }
}

/// Short timeouts so hanging fakes fail fast.
pub fn test_timeouts() -> MountTimeouts {
    MountTimeouts {
        mount: Duration::from_millis(200),
        unmount: Duration::from_millis(200),
        lock: Duration::from_secs(2),
    }
}

/// A manager over a fresh cache root inside `dir`.
pub fn manager(dir: &Path, mounter: Arc<FakeMounter>) -> SshMountManager {
    SshMountManager::new(dir.join("ssh-mounts"), mounter, test_timeouts())
}

pub fn parse_context(cwd: &Path) -> ParseContext {
    ParseContext::new(cwd, Some(PathBuf::from("/home/dev")))
}

pub fn tokens(specs: &[(&str, MountMode)]) -> Vec<(String, MountMode)> {
    specs.iter().map(|(t, m)| (t.to_string(), *m)).collect()
}

/// Network side of a container runtime, kept in memory.
#[derive(Default)]
pub struct FakeNetworks {
    networks: Mutex<HashSet<String>>,
    create_calls: Mutex<usize>,
    lose_race: bool,
    broken: bool,
}

impl FakeNetworks {
    /// Report "missing" on lookup but "already exists" on create, as when
    /// another invocation creates the network in between.
    pub fn losing_race() -> Self {
        Self {
            lose_race: true,
            ..Default::default()
        }
    }

    /// Fail every create with a runtime error.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Default::default()
        }
    }

    pub fn create_calls(&self) -> usize {
        *self.create_calls.lock()
    }

    pub fn has(&self, name: &str) -> bool {
        self.networks.lock().contains(name)
    }
}

#[async_trait]
impl NetworkOps for FakeNetworks {
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError> {
        *self.create_calls.lock() += 1;
        if self.broken {
            return Err(NetworkError::Runtime("daemon unavailable".to_string()));
        }
        if self.lose_race || !self.networks.lock().insert(config.name.clone()) {
            return Err(NetworkError::AlreadyExists(config.name.clone()));
        }
        Ok(NetworkId::new(config.name.clone()))
    }

    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError> {
        if self.lose_race {
            return Ok(false);
        }
        Ok(self.networks.lock().contains(name))
    }
}
