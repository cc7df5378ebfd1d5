// ABOUTME: Standalone SSH mount command and mount inspection/cleanup.
// ABOUTME: Works on the same cache root and registry that runs use.

use super::{Context, shutdown_signal};
use crate::cli::MountsAction;
use boxctl::error::{Error, Result};
use boxctl::mount::{MountMode, RemoteEndpoint};
use boxctl::output::Output;
use std::path::PathBuf;

/// Mount `remote` at `local` and wait for a signal, or leave it up with
/// `detach`.
pub async fn mount(
    ctx: &Context,
    remote: String,
    local: Option<PathBuf>,
    read_only: bool,
    detach: bool,
    output: Output,
) -> Result<()> {
    let endpoint = RemoteEndpoint::parse(&remote).map_err(|source| Error::MalformedMountSpec {
        token: remote.clone(),
        source,
    })?;
    let mode = if read_only {
        MountMode::ReadOnly
    } else {
        MountMode::ReadWrite
    };

    let cwd = std::env::current_dir()?;
    let local = match local {
        Some(path) => std::path::absolute(&path)?,
        None => cwd.join(endpoint.basename()),
    };

    let manager = ctx.mount_manager();
    output.progress(&format!("  → Mounting {} ({})...", endpoint, mode));
    let handle = manager.acquire_at(&endpoint, mode, &local, detach).await?;

    if detach {
        output.success(&format!(
            "Mounted {} at {}; remove with `boxctl mounts unmount {}`",
            endpoint,
            local.display(),
            local.display()
        ));
        return Ok(());
    }

    output.success(&format!(
        "Mounted {} at {} (Ctrl-C to unmount)",
        endpoint,
        local.display()
    ));
    shutdown_signal().await;

    output.progress("  → Unmounting...");
    manager.release(&handle).await?;
    output.success(&format!("Unmounted {}", local.display()));
    Ok(())
}

pub async fn mounts(ctx: &Context, action: MountsAction, output: Output) -> Result<()> {
    let manager = ctx.mount_manager();

    match action {
        MountsAction::List { all } => {
            let records = if all {
                manager.list_records()
            } else {
                manager.list_active()
            };
            let text = if records.is_empty() {
                "No active SSH mounts.".to_string()
            } else {
                records
                    .iter()
                    .map(|r| {
                        format!(
                            "{} -> {} ({}, {}, pid {})",
                            r.endpoint,
                            r.local_mountpoint.display(),
                            r.mode,
                            r.state,
                            r.pid
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            output.data(&records, &text);
        }
        MountsAction::Unmount { path } => {
            let path = std::path::absolute(&path)?;
            if !manager.release_path(&path).await? {
                return Err(Error::MountFailed {
                    endpoint: path.display().to_string(),
                    reason: "no boxctl mount at this path".to_string(),
                });
            }
            output.success(&format!("Unmounted {}", path.display()));
        }
        MountsAction::Cleanup => {
            let report = manager.release_all().await;
            for failure in &report.failed {
                output.error(&failure.to_string());
            }
            let released = report.released.len();
            report.into_result()?;
            output.success(&format!("Released {released} SSH mount(s)"));
        }
    }

    Ok(())
}
