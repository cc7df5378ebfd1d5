// ABOUTME: Runtime detection for the local machine.
// ABOUTME: Honors explicit settings, then checks Podman sockets first, then Docker.

use super::types::{RuntimeConfig, RuntimeInfo, RuntimeType};
use std::path::{Path, PathBuf};

/// Error during runtime detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("configured {runtime} socket {socket} does not exist")]
    SocketMissing { runtime: RuntimeType, socket: String },
}

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Detect the container runtime on this machine.
///
/// Detection order (when not explicitly configured):
/// 1. Rootless Podman socket (`/run/user/$UID/podman/podman.sock`)
/// 2. Rootful Podman socket (`/run/podman/podman.sock`)
/// 3. Docker socket (`/var/run/docker.sock`)
/// 4. Docker Desktop socket (`~/.docker/run/docker.sock`)
///
/// If `config` names a runtime, it wins; its socket must exist.
pub fn detect_local(config: Option<&RuntimeConfig>) -> Result<RuntimeInfo, DetectionError> {
    if let Some(cfg) = config
        && let Some(runtime_type) = cfg.runtime
    {
        let socket_path = cfg
            .socket
            .clone()
            .unwrap_or_else(|| default_socket_path(runtime_type));
        if !Path::new(&socket_path).exists() {
            return Err(DetectionError::SocketMissing {
                runtime: runtime_type,
                socket: socket_path,
            });
        }
        return Ok(RuntimeInfo {
            runtime_type,
            socket_path,
        });
    }

    candidates()
        .into_iter()
        .find(|(_, socket)| socket.exists())
        .map(|(runtime_type, socket)| RuntimeInfo {
            runtime_type,
            socket_path: socket.to_string_lossy().into_owned(),
        })
        .ok_or(DetectionError::NoRuntimeFound)
}

fn candidates() -> Vec<(RuntimeType, PathBuf)> {
    let uid = nix::unistd::getuid();
    let mut sockets = vec![
        (
            RuntimeType::Podman,
            PathBuf::from(format!("/run/user/{uid}/podman/podman.sock")),
        ),
        (RuntimeType::Podman, PathBuf::from(ROOTFUL_PODMAN)),
        (RuntimeType::Docker, PathBuf::from(DOCKER_SOCKET)),
    ];
    if let Some(home) = dirs::home_dir() {
        sockets.push((RuntimeType::Docker, home.join(".docker/run/docker.sock")));
    }
    sockets
}

fn default_socket_path(runtime: RuntimeType) -> String {
    match runtime {
        RuntimeType::Docker => DOCKER_SOCKET.to_string(),
        RuntimeType::Podman => ROOTFUL_PODMAN.to_string(),
    }
}
