// ABOUTME: Assembly state types for the type state pattern.
// ABOUTME: Each state carries what the earlier steps produced.

use crate::image::EnvironmentKind;
use crate::mount::ResolvedMounts;
use crate::network::NetworkPlan;
use crate::sshfs::SshMountHandle;
use crate::types::{ImageRef, ImageTag};

/// Initial state: configuration parsed, nothing touched yet.
/// Available actions: `resolve_mounts()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Parsed;

/// Mounts resolved: SSH mounts for remote sources are up.
/// Available actions: `select_network()`, `rollback()`
#[derive(Debug)]
pub struct MountsResolved {
    pub(crate) mounts: ResolvedMounts,
}

/// Network selected: any required runtime network exists.
/// Available actions: `reconcile()`, `rollback()`
#[derive(Debug)]
pub struct NetworkSelected {
    pub(crate) mounts: ResolvedMounts,
    pub(crate) network: NetworkPlan,
}

/// Image reconciled against the runtime inventory.
/// Available actions: `finish()`, `rollback()`
#[derive(Debug)]
pub struct Reconciled {
    pub(crate) mounts: ResolvedMounts,
    pub(crate) network: NetworkPlan,
    pub(crate) image: ImagePlan,
}

/// Which image a run uses and whether it has to be built first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlan {
    pub environment_kind: EnvironmentKind,
    pub base_image: ImageRef,
    pub image_tag: ImageTag,
    pub needs_rebuild: bool,
}

/// States that own SSH mounts and so must release them on abort.
pub trait HoldsMounts {
    fn cleanup(&self) -> &[SshMountHandle];
}

impl HoldsMounts for MountsResolved {
    fn cleanup(&self) -> &[SshMountHandle] {
        &self.mounts.cleanup
    }
}

impl HoldsMounts for NetworkSelected {
    fn cleanup(&self) -> &[SshMountHandle] {
        &self.mounts.cleanup
    }
}

impl HoldsMounts for Reconciled {
    fn cleanup(&self) -> &[SshMountHandle] {
        &self.mounts.cleanup
    }
}
