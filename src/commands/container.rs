// ABOUTME: Builds box images and runs the container for an assembled request.
// ABOUTME: Both shell out to the runtime's CLI; pulls go through the bollard client.

use boxctl::assemble::RunRequest;
use boxctl::diagnostics::{Diagnostics, Warning};
use boxctl::error::{Error, Result};
use boxctl::image;
use boxctl::output::Output;
use boxctl::runtime::{BollardRuntime, ImageOps};
use std::io::IsTerminal;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Make sure the request's box image exists and return the image to run.
///
/// A failed build is not fatal: the base image is used instead.
pub async fn ensure_image(
    runtime: &BollardRuntime,
    request: &RunRequest,
    output: &Output,
    diag: &mut Diagnostics,
) -> Result<String> {
    if !request.needs_rebuild {
        return Ok(request.image_tag.to_string());
    }

    output.progress(&format!("  → Pulling {}...", request.base_image));
    if !runtime.image_exists(&request.base_image).await? {
        runtime.pull_image(&request.base_image).await?;
    }

    output.progress(&format!("  → Building {}...", request.image_tag));
    match build_image(runtime, request).await {
        Ok(()) => Ok(request.image_tag.to_string()),
        Err(e) => {
            diag.warn(Warning::image_build(format!(
                "building {} failed, using {}: {}",
                request.image_tag, request.base_image, e
            )));
            Ok(request.base_image.to_string())
        }
    }
}

async fn build_image(runtime: &BollardRuntime, request: &RunRequest) -> Result<()> {
    let mut child = Command::new(runtime.runtime_type().binary())
        .args(["build", "-t", request.image_tag.as_str(), "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(image::dockerfile(&request.base_image).as_bytes())
            .await?;
    }

    let result = child.wait_with_output().await?;
    if result.status.success() {
        tracing::debug!("built {}", request.image_tag);
        return Ok(());
    }
    Err(Error::Runtime(format!(
        "build exited with {}: {}",
        result.status,
        String::from_utf8_lossy(&result.stderr).trim()
    )))
}

/// Run the container in the foreground and return its exit code.
///
/// Interrupts reach the container through the terminal; this process keeps
/// waiting so cleanup still happens once the container is gone.
pub async fn execute(runtime: &BollardRuntime, request: &RunRequest, image: &str) -> Result<i32> {
    let tty = std::io::stdin().is_terminal();
    let args = request.to_cli_args(image, tty);
    tracing::debug!("{} {}", runtime.runtime_type(), args.join(" "));

    let mut child = Command::new(runtime.runtime_type().binary())
        .args(&args)
        .spawn()?;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status?,
            _ = super::shutdown_signal() => {
                tracing::debug!("signal received while the container runs, waiting for it");
            }
        }
    };

    // killed by a signal: report it the way shells do
    Ok(status.code().unwrap_or(130))
}
