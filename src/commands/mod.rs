// ABOUTME: Command module aggregator for the boxctl CLI.
// ABOUTME: Holds the shared command context and re-exports each handler.

mod clean;
mod configs;
mod container;
mod mounts;
mod run;
mod runtime_connection;

pub use clean::clean;
pub use configs::configs;
pub use mounts::{mount, mounts};
pub use run::run;

use boxctl::error::Result;
use boxctl::settings::{self, Settings};
use boxctl::sshfs::{SshMountManager, SshfsMounter};
use boxctl::store::ConfigStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};

/// Settings and locations every command works from.
pub struct Context {
    pub home: PathBuf,
    pub settings: Settings,
}

impl Context {
    pub fn load() -> Result<Self> {
        let home = settings::home_dir()?;
        let settings = Settings::discover(&home)?;
        Ok(Self { home, settings })
    }

    pub fn store(&self) -> ConfigStore {
        ConfigStore::in_home(&self.home)
    }

    pub fn mount_manager(&self) -> SshMountManager {
        SshMountManager::new(
            self.settings.cache_root(),
            Arc::new(SshfsMounter::new()),
            self.settings.timeouts(),
        )
    }
}

/// Resolves on the first SIGINT or SIGTERM.
pub(crate) async fn shutdown_signal() {
    let (Ok(mut sigterm), Ok(mut sigint)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        tracing::warn!("cannot install signal handlers");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::debug!("received SIGTERM"),
        _ = sigint.recv() => tracing::debug!("received SIGINT"),
    }
}
