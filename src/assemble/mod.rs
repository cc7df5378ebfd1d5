// ABOUTME: Run request assembly using the type state pattern.
// ABOUTME: Parsed input becomes a RunRequest; mounts are rolled back on any failure.

mod assembly;
mod config;
mod request;
mod state;
mod transitions;

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::Result;
use crate::runtime::NetworkOps;
use crate::sshfs::SshMountManager;

pub use assembly::Assembly;
pub use config::{RunConfiguration, RunInput};
pub use request::RunRequest;
pub use state::{HoldsMounts, ImagePlan, MountsResolved, NetworkSelected, Parsed, Reconciled};
pub use transitions::TransitionResult;

/// Drive a parsed configuration through every step.
///
/// On failure, SSH mounts acquired for this run are released before the
/// error is returned. Release problems are logged; the original error wins.
pub async fn assemble<N>(
    config: RunConfiguration,
    cwd: impl Into<PathBuf>,
    manager: &SshMountManager,
    runtime: Option<&N>,
    inventory: &HashSet<String>,
) -> Result<RunRequest>
where
    N: NetworkOps + ?Sized,
{
    let parsed = Assembly::new(config, cwd);

    let resolved = parsed
        .resolve_mounts(manager)
        .await
        .map_err(|(_, e)| e)?;

    let selected = match resolved.select_network(runtime).await {
        Ok(selected) => selected,
        Err((resolved, e)) => {
            resolved.rollback(manager).await;
            return Err(e);
        }
    };

    match selected.reconcile(inventory) {
        Ok(reconciled) => Ok(reconciled.finish()),
        Err((selected, e)) => {
            selected.rollback(manager).await;
            Err(e)
        }
    }
}
