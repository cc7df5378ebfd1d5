// ABOUTME: State transition methods for run assembly.
// ABOUTME: Each method consumes self and hands the previous state back on failure.

use std::collections::HashSet;

use crate::error::Error;
use crate::image::{self, EnvironmentKind};
use crate::mount::{self, CONTAINER_HOME};
use crate::network;
use crate::runtime::NetworkOps;
use crate::sshfs::{ReleaseReport, SshMountManager};
use crate::store::{ConfigStore, Reconciliation};

use super::Assembly;
use super::request::RunRequest;
use super::state::{HoldsMounts, ImagePlan, MountsResolved, NetworkSelected, Parsed, Reconciled};

/// Result type for transitions that may need rollback on failure.
pub type TransitionResult<T, S> = Result<Assembly<T>, (Assembly<S>, Error)>;

impl<S> Assembly<S> {
    fn transition<T>(self, state: T) -> Assembly<T> {
        Assembly {
            config: self.config,
            cwd: self.cwd,
            state,
        }
    }
}

// =============================================================================
// Parsed -> MountsResolved
// =============================================================================

impl Assembly<Parsed> {
    /// Resolve every mount, bringing up SSH mounts as needed.
    ///
    /// A failure has already released whatever this step mounted.
    pub async fn resolve_mounts(
        self,
        manager: &SshMountManager,
    ) -> TransitionResult<MountsResolved, Parsed> {
        match mount::resolve(&self.config.mounts, manager).await {
            Ok(mounts) => {
                tracing::debug!(
                    "resolved {} mount(s), {} over ssh",
                    mounts.mounts.len(),
                    mounts.cleanup.len()
                );
                Ok(self.transition(MountsResolved { mounts }))
            }
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// MountsResolved -> NetworkSelected
// =============================================================================

impl Assembly<MountsResolved> {
    /// Plan the network and make sure any network it needs exists.
    ///
    /// Without a runtime the plan is still produced; creating the network is
    /// left to whoever starts the container.
    pub async fn select_network<N>(
        self,
        runtime: Option<&N>,
    ) -> TransitionResult<NetworkSelected, MountsResolved>
    where
        N: NetworkOps + ?Sized,
    {
        let plan = self.config.network.plan();

        match runtime {
            Some(runtime) => {
                if let Err(e) = network::ensure_network(&plan, runtime).await {
                    return Err((self, e));
                }
            }
            None if plan.ensure_network.is_some() => {
                tracing::debug!("no runtime available, not creating network");
            }
            None => {}
        }

        let MountsResolved { mounts } = self.state;
        Ok(Assembly {
            config: self.config,
            cwd: self.cwd,
            state: NetworkSelected {
                mounts,
                network: plan,
            },
        })
    }
}

// =============================================================================
// NetworkSelected -> Reconciled
// =============================================================================

impl Assembly<NetworkSelected> {
    /// Pick the image and check it against `inventory`, the box image tags
    /// the runtime currently has.
    ///
    /// Environment detection looks at the first mount's directory, or the
    /// invocation directory when nothing is mounted.
    pub fn reconcile(
        self,
        inventory: &HashSet<String>,
    ) -> TransitionResult<Reconciled, NetworkSelected> {
        let environment_kind = match self.config.environment {
            Some(kind) => kind,
            None => {
                let dir = self
                    .state
                    .mounts
                    .mounts
                    .first()
                    .map(|m| m.host_path.as_path())
                    .unwrap_or(self.cwd.as_path());
                let kind = EnvironmentKind::detect(&self.config.command, &image::list_entries(dir));
                tracing::debug!("detected {} environment from {}", kind, dir.display());
                kind
            }
        };

        let base_image = match image::base_image(
            environment_kind,
            self.config.version.as_deref(),
            self.config.custom_image.as_deref(),
        ) {
            Ok(base) => base,
            Err(e) => return Err((self, e)),
        };

        let named = self.config.name.as_ref().and_then(|name| {
            self.config
                .to_named(environment_kind, image::named_image_tag(name))
        });
        let reconciliation = match named {
            Some(snapshot) => ConfigStore::reconcile(&snapshot, inventory),
            None => {
                let tag = image::adhoc_image_tag(&base_image);
                Reconciliation {
                    needs_rebuild: !inventory.contains(tag.as_str()),
                    image_tag: tag,
                }
            }
        };

        let image = ImagePlan {
            environment_kind,
            base_image,
            image_tag: reconciliation.image_tag,
            needs_rebuild: reconciliation.needs_rebuild,
        };
        let NetworkSelected { mounts, network } = self.state;
        Ok(Assembly {
            config: self.config,
            cwd: self.cwd,
            state: Reconciled {
                mounts,
                network,
                image,
            },
        })
    }
}

// =============================================================================
// Reconciled -> RunRequest
// =============================================================================

impl Assembly<Reconciled> {
    /// Hand the run over. The request now owns the SSH mounts.
    pub fn finish(self) -> RunRequest {
        let Reconciled {
            mounts,
            network,
            image,
        } = self.state;

        let snapshot = self
            .config
            .to_named(image.environment_kind, image.image_tag.clone());

        RunRequest {
            environment_kind: image.environment_kind,
            base_image: image.base_image,
            image_tag: image.image_tag,
            needs_rebuild: image.needs_rebuild,
            working_directory: mounts
                .working_directory
                .unwrap_or_else(|| CONTAINER_HOME.to_string()),
            mounts: mounts.mounts,
            ports: self.config.ports,
            network: self.config.network,
            network_args: network.args,
            env: network.env,
            command: self.config.command,
            cleanup: mounts.cleanup,
            snapshot,
        }
    }
}

// =============================================================================
// Rollback
// =============================================================================

impl<S: HoldsMounts> Assembly<S> {
    /// Release this run's SSH mounts, newest first, and start over.
    pub async fn rollback(self, manager: &SshMountManager) -> (Assembly<Parsed>, ReleaseReport) {
        let report = manager.release_handles(self.state.cleanup()).await;
        for failure in &report.failed {
            tracing::warn!("rollback left a mount behind: {}", failure);
        }
        (self.transition(Parsed), report)
    }
}
