// ABOUTME: Mount specifications and their resolution into container volumes.
// ABOUTME: Parsing is pure; resolution may create SSH mounts.

mod resolver;
mod spec;

pub use resolver::{ResolvedMount, ResolvedMounts, check_conflicts, resolve};
pub use spec::{
    CONTAINER_HOME, MountMode, MountSource, MountSpec, MountSpecError, ParseContext,
    RemoteEndpoint,
};
