// ABOUTME: Turns parsed mount specs into host-path/container-path pairs.
// ABOUTME: Remote specs are mounted through the SSH mount manager first.

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

use super::spec::{MountMode, MountSource, MountSpec};
use crate::error::{Error, Result};
use crate::sshfs::{SshMountHandle, SshMountManager};

/// One mount ready to hand to the container runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedMount {
    pub source: MountSource,
    /// Local directory bound into the container; the sshfs mountpoint for
    /// remote sources.
    pub host_path: PathBuf,
    pub container_path: String,
    pub mode: MountMode,
    pub order: usize,
}

impl ResolvedMount {
    /// `host:container:ro|rw` as used by `-v`.
    pub fn volume_arg(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path,
            self.mode.as_flag()
        )
    }
}

/// The ordered mount list of one run plus the SSH mounts it owns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedMounts {
    pub mounts: Vec<ResolvedMount>,
    /// Container path of the first mount, if any.
    pub working_directory: Option<String>,
    /// SSH mounts created or leased for this run, in creation order.
    pub cleanup: Vec<SshMountHandle>,
}

/// Check that no two specs land on the same container path.
pub fn check_conflicts(specs: &[MountSpec]) -> Result<()> {
    let mut seen: HashMap<String, &MountSpec> = HashMap::new();
    for spec in specs {
        let target = spec.target();
        if let Some(first) = seen.get(&target) {
            return Err(Error::MountConflict {
                container_path: target,
                first: first.source.to_string(),
                second: spec.source.to_string(),
            });
        }
        seen.insert(target, spec);
    }
    Ok(())
}

/// Resolve specs in order. On failure every SSH mount acquired here is
/// released, newest first, before the error is returned.
///
/// Dropping the returned future part way leaves its leases with `manager`;
/// `SshMountManager::release_session` rolls those back.
pub async fn resolve(specs: &[MountSpec], manager: &SshMountManager) -> Result<ResolvedMounts> {
    let mut ordered: Vec<&MountSpec> = specs.iter().collect();
    ordered.sort_by_key(|spec| spec.order);

    // conflicts are known before anything is mounted
    check_conflicts(specs)?;

    let mut resolved = ResolvedMounts::default();
    for spec in ordered {
        let host_path = match &spec.source {
            MountSource::Local { path } => path.clone(),
            MountSource::Remote(endpoint) => match manager.acquire(endpoint, spec.mode).await {
                Ok(handle) => {
                    let mountpoint = handle.mountpoint().to_path_buf();
                    resolved.cleanup.push(handle);
                    mountpoint
                }
                Err(e) => {
                    tracing::debug!(
                        "rolling back {} ssh mount(s) after failure on {}",
                        resolved.cleanup.len(),
                        endpoint
                    );
                    let report = manager.release_handles(&resolved.cleanup).await;
                    for failure in &report.failed {
                        tracing::warn!("rollback left a mount behind: {}", failure);
                    }
                    return Err(e.into());
                }
            },
        };

        let container_path = spec.target();
        if resolved.working_directory.is_none() {
            resolved.working_directory = Some(container_path.clone());
        }
        resolved.mounts.push(ResolvedMount {
            source: spec.source.clone(),
            host_path,
            container_path,
            mode: spec.mode,
            order: spec.order,
        });
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mount::ParseContext;

    fn specs(tokens: &[&str]) -> Vec<MountSpec> {
        let ctx = ParseContext::new("/work", None);
        MountSpec::parse_all(tokens.iter().map(|t| (*t, MountMode::ReadOnly)), &ctx).unwrap()
    }

    #[test]
    fn distinct_targets_pass() {
        assert!(check_conflicts(&specs(&["./a", "./b", "./a:/srv/a"])).is_ok());
    }

    #[test]
    fn same_basename_conflicts() {
        let err = check_conflicts(&specs(&["./x/data", "./y/data"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MountConflict);
        match err {
            Error::MountConflict {
                container_path,
                first,
                second,
            } => {
                assert_eq!(container_path, "/root/data");
                assert_eq!(first, "/work/x/data");
                assert_eq!(second, "/work/y/data");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn explicit_target_conflicts_with_derived_one() {
        let err = check_conflicts(&specs(&["./src", "dev@host:/code:/root/src"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MountConflict);
    }

    #[test]
    fn volume_arg_carries_mode() {
        let mount = ResolvedMount {
            source: MountSource::Local {
                path: PathBuf::from("/work/src"),
            },
            host_path: PathBuf::from("/work/src"),
            container_path: "/root/src".into(),
            mode: MountMode::ReadWrite,
            order: 0,
        };
        assert_eq!(mount.volume_arg(), "/work/src:/root/src:rw");
    }
}
