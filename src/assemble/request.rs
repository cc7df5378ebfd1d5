// ABOUTME: The fully assembled run request handed to the container executor.
// ABOUTME: Renders itself into runtime CLI arguments.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::image::EnvironmentKind;
use crate::mount::{CONTAINER_HOME, ResolvedMount};
use crate::network::NetworkMode;
use crate::ports::PortMapping;
use crate::sshfs::SshMountHandle;
use crate::store::NamedConfiguration;
use crate::types::{ImageRef, ImageTag};

const DEFAULT_COMMAND: &str = "/bin/bash";

/// Everything the executor needs to start one container.
///
/// `cleanup` holds the SSH mounts this run owns; pass them to
/// `SshMountManager::release_handles` once the container exits.
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    pub environment_kind: EnvironmentKind,
    pub base_image: ImageRef,
    pub image_tag: ImageTag,
    pub needs_rebuild: bool,
    pub mounts: Vec<ResolvedMount>,
    pub working_directory: String,
    pub ports: Vec<PortMapping>,
    pub network: NetworkMode,
    pub network_args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub command: Vec<String>,
    pub cleanup: Vec<SshMountHandle>,
    /// Configuration to persist when this is a named run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<NamedConfiguration>,
}

impl RunRequest {
    /// Arguments for `<runtime> run`, starting with `run`, using `image`
    /// (the box image, or the base image when building failed).
    pub fn to_cli_args(&self, image: &str, tty: bool) -> Vec<String> {
        let mut args: Vec<String> = vec!["run".into(), "--rm".into(), "-i".into()];
        if tty {
            args.push("-t".into());
        }

        for mount in &self.mounts {
            args.push("-v".into());
            args.push(mount.volume_arg());
        }
        for port in &self.ports {
            args.push("-p".into());
            args.push(port.to_string());
        }

        args.push("-w".into());
        args.push(self.working_directory.clone());
        args.extend(self.network_args.iter().cloned());
        for (key, value) in &self.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }

        args.push(image.to_string());
        if self.command.is_empty() {
            args.push(DEFAULT_COMMAND.into());
        } else {
            args.extend(self.command.iter().cloned());
        }
        args
    }

    /// Whether the working directory came from a mount.
    pub fn has_mounted_workdir(&self) -> bool {
        self.working_directory != CONTAINER_HOME
    }
}
