// ABOUTME: Run command implementation.
// ABOUTME: Assembles the run, builds the image, runs the container and releases mounts.

use super::container::{ensure_image, execute};
use super::runtime_connection::connect_to_runtime;
use super::{Context, shutdown_signal};
use crate::cli::RunArgs;
use boxctl::assemble::{RunConfiguration, RunInput, RunRequest, assemble};
use boxctl::diagnostics::{Diagnostics, Warning};
use boxctl::error::{Error, Result};
use boxctl::image::EnvironmentKind;
use boxctl::mount::ParseContext;
use boxctl::network::NetworkFlags;
use boxctl::output::Output;
use boxctl::runtime::{BollardRuntime, ImageOps};
use boxctl::sshfs::{ReleaseReport, SshMountManager};
use boxctl::types::{BOX_IMAGE_PREFIX, ConfigName};
use std::collections::HashSet;

/// Run one container. Returns the container's exit code.
pub async fn run(ctx: &Context, args: RunArgs, mut output: Output) -> Result<i32> {
    output.start_timer();
    let mut diag = Diagnostics::default();
    let parse_ctx = ParseContext::current()?;
    let store = ctx.store();

    let input = run_input(&args, ctx.settings.http_proxy.clone());
    let config = match &args.config {
        Some(name) => {
            let saved = store.load(name)?;
            output.progress(&format!("  → Using configuration '{}'", saved.name));
            RunConfiguration::from_named(&saved, &input, &parse_ctx)?
        }
        None => RunConfiguration::parse(&input, &parse_ctx)?,
    };

    // reject a taken name before anything gets mounted
    let config = match &args.save {
        Some(name) => {
            let name =
                ConfigName::new(name).map_err(|e| Error::Configuration(e.to_string()))?;
            if !args.force && store.list()?.iter().any(|n| n == name.as_str()) {
                return Err(Error::DuplicateName(name.to_string()));
            }
            config.named(name)
        }
        None => config,
    };

    let runtime = match connect_to_runtime(ctx, &output).await {
        Ok(runtime) => Some(runtime),
        Err(e) if args.dry_run => {
            diag.warn(Warning::runtime_unavailable(e.to_string()));
            None
        }
        Err(e) => return Err(e),
    };
    let inventory = image_inventory(runtime.as_ref()).await?;

    let manager = ctx.mount_manager();
    output.progress("  → Preparing mounts and network...");
    let outcome = tokio::select! {
        result = assemble(config, &parse_ctx.cwd, &manager, runtime.as_ref(), &inventory) => Some(result),
        _ = shutdown_signal() => None,
    };
    let request = match outcome {
        Some(result) => result?,
        None => {
            diag.record_release(&manager.release_session().await);
            output.warnings(&diag);
            return Err(Error::Interrupted);
        }
    };

    let result = match runtime {
        Some(runtime) if !args.dry_run => {
            start(&runtime, &request, args.save.is_some(), ctx, &output, &mut diag).await
        }
        _ => {
            output.data(&request, &describe(&request));
            Ok(0)
        }
    };

    diag.record_release(&release(&manager, &request).await);
    output.warnings(&diag);
    result
}

async fn start(
    runtime: &BollardRuntime,
    request: &RunRequest,
    save: bool,
    ctx: &Context,
    output: &Output,
    diag: &mut Diagnostics,
) -> Result<i32> {
    let image = ensure_image(runtime, request, output, diag).await?;

    if save && let Some(snapshot) = &request.snapshot {
        if let Err(e) = ctx.store().save(&snapshot.name, snapshot, true) {
            diag.warn(Warning::config_save(format!(
                "could not save configuration '{}': {}",
                snapshot.name, e
            )));
        } else {
            output.progress(&format!("  → Saved configuration '{}'", snapshot.name));
        }
    }

    output.progress(&format!("  → Starting {image} in {}", request.working_directory));
    execute(runtime, request, &image).await
}

async fn release(manager: &SshMountManager, request: &RunRequest) -> ReleaseReport {
    if request.cleanup.is_empty() {
        return ReleaseReport::default();
    }
    manager.release_handles(&request.cleanup).await
}

/// Box image tags present in the runtime; empty without a runtime.
async fn image_inventory(runtime: Option<&BollardRuntime>) -> Result<HashSet<String>> {
    match runtime {
        Some(runtime) => Ok(runtime.list_image_tags(BOX_IMAGE_PREFIX).await?),
        None => Ok(HashSet::new()),
    }
}

fn run_input(args: &RunArgs, fallback_proxy: Option<String>) -> RunInput {
    let environment = if args.node {
        Some(EnvironmentKind::Node)
    } else if args.python {
        Some(EnvironmentKind::Python)
    } else {
        None
    };

    RunInput {
        mounts: args.mounts.clone(),
        ports: args.ports.clone(),
        network: NetworkFlags {
            none: args.no_network,
            internal: args.internal,
            proxy: args.proxy.clone(),
        },
        command: args.command.clone(),
        environment,
        version: args.version.clone(),
        image: args.image.clone(),
        fallback_proxy,
    }
}

fn describe(request: &RunRequest) -> String {
    let mut lines = vec![
        format!("environment: {}", request.environment_kind),
        format!(
            "image:       {}{}",
            request.image_tag,
            if request.needs_rebuild {
                format!(" (build from {})", request.base_image)
            } else {
                String::new()
            }
        ),
        format!(
            "workdir:     {}{}",
            request.working_directory,
            if request.has_mounted_workdir() {
                " (first mount)"
            } else {
                " (container home)"
            }
        ),
        format!("network:     {}", request.network),
    ];
    for mount in &request.mounts {
        lines.push(format!(
            "mount:       {} -> {} ({})",
            mount.source, mount.container_path, mount.mode
        ));
    }
    for port in &request.ports {
        lines.push(format!("port:        {port}"));
    }
    if let Some(snapshot) = &request.snapshot {
        lines.push(format!("config:      {}", snapshot.name));
    }
    lines.join("\n")
}
