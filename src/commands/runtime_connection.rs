// ABOUTME: Shared helper for connecting to the local container runtime.
// ABOUTME: Used by run and clean; reports what it found through Output.

use super::Context;
use boxctl::error::Result;
use boxctl::output::Output;
use boxctl::runtime::{BollardRuntime, connect_local};

/// Detect and connect to the local runtime, reporting progress.
pub async fn connect_to_runtime(ctx: &Context, output: &Output) -> Result<BollardRuntime> {
    output.progress("  → Detecting runtime...");
    let runtime = match connect_local(ctx.settings.runtime_override()).await {
        Ok(runtime) => runtime,
        Err(e) => {
            if let Some(hint) = e.hint() {
                output.progress(&format!("  → {hint}"));
            }
            return Err(e.into());
        }
    };

    output.progress(&format!(
        "  → Found {} at {}",
        runtime.runtime_type(),
        runtime.socket_path()
    ));

    Ok(runtime)
}
