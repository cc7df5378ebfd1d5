// ABOUTME: Generic assembly struct parameterized by state.
// ABOUTME: State types carry their own data, so accessors exist only where the data does.

use std::path::{Path, PathBuf};

use crate::mount::ResolvedMount;
use crate::network::NetworkPlan;

use super::config::RunConfiguration;
use super::state::{ImagePlan, MountsResolved, NetworkSelected, Parsed, Reconciled};

/// A run being assembled, parameterized by how far it has come.
#[derive(Debug)]
pub struct Assembly<S> {
    pub(crate) config: RunConfiguration,
    /// Host directory the command was started from.
    pub(crate) cwd: PathBuf,
    pub(crate) state: S,
}

impl Assembly<Parsed> {
    pub fn new(config: RunConfiguration, cwd: impl Into<PathBuf>) -> Self {
        Assembly {
            config,
            cwd: cwd.into(),
            state: Parsed,
        }
    }
}

impl<S> Assembly<S> {
    pub fn config(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }
}

impl Assembly<MountsResolved> {
    pub fn mounts(&self) -> &[ResolvedMount] {
        &self.state.mounts.mounts
    }
}

impl Assembly<NetworkSelected> {
    pub fn mounts(&self) -> &[ResolvedMount] {
        &self.state.mounts.mounts
    }

    pub fn network(&self) -> &NetworkPlan {
        &self.state.network
    }
}

impl Assembly<Reconciled> {
    pub fn mounts(&self) -> &[ResolvedMount] {
        &self.state.mounts.mounts
    }

    pub fn network(&self) -> &NetworkPlan {
        &self.state.network
    }

    pub fn image(&self) -> &ImagePlan {
        &self.state.image
    }
}
