// ABOUTME: Entry point for the boxctl CLI application.
// ABOUTME: Parses arguments and dispatches to the command handlers.

mod cli;
mod commands;

use boxctl::error::{Error, ErrorKind, Result};
use boxctl::output::{Output, OutputMode};
use cli::{Cli, Commands};
use commands::Context;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_ordered();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from_flags(cli.quiet, cli.json);
    match run(cli, mode).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            Output::new(mode).error(&e.to_string());
            std::process::exit(exit_code(&e));
        }
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<i32> {
    let ctx = Context::load()?;
    let output = Output::new(mode);

    match cli.command {
        Commands::Run(args) => commands::run(&ctx, args, output).await,
        Commands::Clean => commands::clean(&ctx, output).await.map(|()| 0),
        Commands::Mount {
            remote,
            local,
            read_only,
            detach,
        } => commands::mount(&ctx, remote, local, read_only, detach, output)
            .await
            .map(|()| 0),
        Commands::Mounts { action } => commands::mounts(&ctx, action, output).await.map(|()| 0),
        Commands::Configs { action } => commands::configs(&ctx, action, output).map(|()| 0),
    }
}

fn exit_code(error: &Error) -> i32 {
    match error.kind() {
        ErrorKind::Interrupted => 130,
        _ if error.is_parse_time() => 2,
        _ => 1,
    }
}
