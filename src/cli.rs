// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and keeps --ro/--rw mounts in command line order.

use boxctl::mount::MountMode;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "boxctl")]
#[command(about = "Run commands in throwaway Docker or Podman containers")]
#[command(version)]
pub struct Cli {
    /// Log lifecycle details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print results and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a command (default: bash) in a fresh container
    Run(RunArgs),

    /// Remove all images built by boxctl
    Clean,

    /// Mount a remote directory over SSH at a local path
    Mount {
        /// Remote location, user@host:path
        remote: String,

        /// Local mountpoint (default: last component of the remote path)
        local: Option<PathBuf>,

        /// Mount read-only
        #[arg(short, long)]
        read_only: bool,

        /// Leave the mount up and exit instead of waiting for Ctrl-C
        #[arg(short, long)]
        detach: bool,
    },

    /// Inspect and clean up SSH mounts
    Mounts {
        #[command(subcommand)]
        action: MountsAction,
    },

    /// Manage named configurations
    Configs {
        #[command(subcommand)]
        action: ConfigsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum MountsAction {
    /// List SSH mounts that are up
    List {
        /// Include stale and half-finished records
        #[arg(short, long)]
        all: bool,
    },

    /// Unmount the SSH mount at a local path
    Unmount { path: PathBuf },

    /// Unmount every SSH mount boxctl manages
    Cleanup,
}

#[derive(Debug, Subcommand)]
pub enum ConfigsAction {
    /// List saved configuration names
    List,

    /// Show one saved configuration
    Show { name: String },

    /// Delete a saved configuration
    Delete { name: String },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Use the Node.js image (default version: lts)
    #[arg(long, conflicts_with_all = ["python", "image"])]
    pub node: bool,

    /// Use the Python image (default version: latest)
    #[arg(long, visible_alias = "py", conflicts_with = "image")]
    pub python: bool,

    /// Use a custom base image
    #[arg(long, value_name = "IMAGE")]
    pub image: Option<String>,

    /// Image version, e.g. 18 for Node 18 or 3.12 for Python 3.12
    #[arg(short = 'V', long = "image-version", value_name = "VERSION")]
    pub version: Option<String>,

    /// Publish a port: PORT or HOST:CONTAINER
    #[arg(short, long = "port", value_name = "PORT")]
    pub ports: Vec<String>,

    /// Mount read-only: PATH[:DEST] or user@host:PATH[:DEST]
    #[arg(long, visible_alias = "read-only", value_name = "SPEC")]
    pub ro: Vec<String>,

    /// Mount read-write: PATH[:DEST] or user@host:PATH[:DEST]
    #[arg(long, visible_alias = "read-write", value_name = "SPEC")]
    pub rw: Vec<String>,

    /// Run without any network
    #[arg(long)]
    pub no_network: bool,

    /// Run on the isolated box-internal network
    #[arg(long)]
    pub internal: bool,

    /// Send traffic through an HTTP proxy (default: http_proxy from settings)
    #[arg(long, value_name = "HOST:PORT", num_args = 0..=1, require_equals = true)]
    pub proxy: Option<Option<String>>,

    /// Start from a saved configuration
    #[arg(long, value_name = "NAME")]
    pub config: Option<String>,

    /// Save this run as a named configuration
    #[arg(long, value_name = "NAME", conflicts_with = "config")]
    pub save: Option<String>,

    /// Overwrite an existing configuration with --save
    #[arg(long, requires = "save")]
    pub force: bool,

    /// Print the assembled run request instead of starting a container
    #[arg(long)]
    pub dry_run: bool,

    /// Command to run inside the container
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,

    /// `--ro` and `--rw` values merged in the order they were given.
    #[arg(skip)]
    pub mounts: Vec<(String, MountMode)>,
}

impl Cli {
    /// Parse the process arguments, exiting on error like `Parser::parse`.
    pub fn parse_ordered() -> Self {
        match Self::try_parse_ordered_from(std::env::args_os()) {
            Ok(cli) => cli,
            Err(e) => e.exit(),
        }
    }

    pub fn try_parse_ordered_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;
        if let Commands::Run(run) = &mut cli.command
            && let Some(("run", sub)) = matches.subcommand()
        {
            run.mounts = ordered_mounts(sub);
        }
        Ok(cli)
    }
}

fn ordered_mounts(matches: &ArgMatches) -> Vec<(String, MountMode)> {
    let mut indexed: Vec<(usize, String, MountMode)> = Vec::new();
    for (id, mode) in [("ro", MountMode::ReadOnly), ("rw", MountMode::ReadWrite)] {
        if let (Some(values), Some(indices)) =
            (matches.get_many::<String>(id), matches.indices_of(id))
        {
            indexed.extend(
                indices
                    .zip(values)
                    .map(|(index, value)| (index, value.clone(), mode)),
            );
        }
    }
    indexed.sort_by_key(|(index, _, _)| *index);
    indexed
        .into_iter()
        .map(|(_, value, mode)| (value, mode))
        .collect()
}
