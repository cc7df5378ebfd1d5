// ABOUTME: The Mounter seam and its sshfs implementation.
// ABOUTME: Spawns sshfs in the foreground, waits for the mount, unmounts with fallbacks.

use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::fs::File;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};

use super::MountError;
use crate::mount::{MountMode, RemoteEndpoint};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

const SSHFS_OPTIONS: &[&str] = &[
    "StrictHostKeyChecking=accept-new",
    "ConnectTimeout=10",
    "ServerAliveInterval=15",
    "ServerAliveCountMax=3",
    "follow_symlinks",
    "auto_cache",
    "kernel_cache",
    "reconnect",
];

/// Everything a mounter needs to bring one endpoint up.
#[derive(Debug, Clone, Copy)]
pub struct MountRequest<'a> {
    pub endpoint: &'a RemoteEndpoint,
    pub mountpoint: &'a Path,
    pub mode: MountMode,
    /// Where the mount process should write its diagnostics.
    pub log_path: &'a Path,
}

/// Performs the actual filesystem mounts for the mount manager.
///
/// Callers bound every call with a timeout; dropping a pending `mount`
/// future must not leave a half-started mount process behind.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Mount the endpoint and return the pid of the process serving it.
    async fn mount(&self, request: &MountRequest<'_>) -> Result<u32, MountError>;

    /// Unmount, succeeding if nothing is mounted there.
    async fn unmount(&self, mountpoint: &Path) -> Result<(), MountError>;

    fn is_mounted(&self, mountpoint: &Path) -> bool;

    fn is_alive(&self, pid: u32) -> bool {
        process_alive(pid)
    }

    /// Ask the mount process to exit. Best effort.
    fn terminate(&self, pid: u32) {
        if let Some(pid) = to_pid(pid) {
            let _ = signal::kill(pid, Signal::SIGTERM);
        }
    }
}

/// Whether a process with this pid exists. Pid 0 is never alive.
pub fn process_alive(pid: u32) -> bool {
    match to_pid(pid) {
        Some(pid) => matches!(signal::kill(pid, None), Ok(()) | Err(nix::errno::Errno::EPERM)),
        None => false,
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// The `-o` option string passed to sshfs.
pub fn sshfs_options(mode: MountMode) -> String {
    let mut options = SSHFS_OPTIONS.to_vec();
    if mode.is_read_only() {
        options.push("ro");
    }
    options.join(",")
}

/// Mounts through the `sshfs` binary.
#[derive(Debug, Clone)]
pub struct SshfsMounter {
    program: OsString,
}

impl Default for SshfsMounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SshfsMounter {
    pub fn new() -> Self {
        Self {
            program: OsString::from("sshfs"),
        }
    }
}

/// Kills the wrapped child on drop unless disarmed.
struct ChildGuard {
    child: Child,
    armed: bool,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        // Dropping a tokio Child leaves the process running.
        if self.armed {
            let _ = self.child.start_kill();
        }
    }
}

#[async_trait]
impl Mounter for SshfsMounter {
    async fn mount(&self, request: &MountRequest<'_>) -> Result<u32, MountError> {
        let target = request.endpoint.to_string();
        let log = File::create(request.log_path)?;

        let mut command = Command::new(&self.program);
        command
            .arg("-f")
            .arg(&target)
            .arg(request.mountpoint)
            .arg("-o")
            .arg(sshfs_options(request.mode))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            // keep terminal signals away from sshfs; teardown is ours
            .process_group(0);

        tracing::debug!(
            "spawning sshfs for {} at {}",
            target,
            request.mountpoint.display()
        );
        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MountError::SshfsMissing {
                target: target.clone(),
            },
            _ => MountError::Io(e),
        })?;
        let mut guard = ChildGuard { child, armed: true };

        loop {
            if let Some(status) = guard.child.try_wait()? {
                return Err(MountError::Failed {
                    reason: failure_reason(status, request.log_path),
                    target,
                });
            }
            if self.is_mounted(request.mountpoint) {
                guard.armed = false;
                return Ok(guard.child.id().unwrap_or_default());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn unmount(&self, mountpoint: &Path) -> Result<(), MountError> {
        if !self.is_mounted(mountpoint) {
            return Ok(());
        }

        let mut last_error = String::from("no unmount command succeeded");
        for argv in unmount_commands(mountpoint) {
            let Some((program, args)) = argv.split_first() else {
                continue;
            };
            let output = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await;
            match output {
                Ok(out) if out.status.success() && !self.is_mounted(mountpoint) => {
                    tracing::debug!(
                        "unmounted {} with {}",
                        mountpoint.display(),
                        program.to_string_lossy()
                    );
                    return Ok(());
                }
                Ok(out) => {
                    last_error = String::from_utf8_lossy(&out.stderr).trim().to_string();
                }
                Err(e) => {
                    last_error = format!("{}: {e}", program.to_string_lossy());
                }
            }
        }

        Err(MountError::Unmount {
            target: mountpoint.display().to_string(),
            reason: last_error,
        })
    }

    fn is_mounted(&self, mountpoint: &Path) -> bool {
        mount_table().is_some_and(|table| mount_table_contains(&table, mountpoint))
    }
}

fn unmount_commands(mountpoint: &Path) -> Vec<Vec<OsString>> {
    let path = mountpoint.as_os_str().to_owned();
    let cmd = |parts: &[&str]| {
        let mut argv: Vec<OsString> = parts.iter().map(OsString::from).collect();
        argv.push(path.clone());
        argv
    };
    if cfg!(target_os = "macos") {
        vec![
            cmd(&["diskutil", "unmount"]),
            cmd(&["diskutil", "unmount", "force"]),
            cmd(&["umount"]),
        ]
    } else {
        vec![
            cmd(&["fusermount", "-u"]),
            cmd(&["fusermount3", "-u"]),
            cmd(&["umount"]),
        ]
    }
}

fn mount_table() -> Option<String> {
    if let Ok(table) = std::fs::read_to_string("/proc/self/mounts") {
        return Some(table);
    }
    std::process::Command::new("mount")
        .output()
        .ok()
        .map(|out| String::from_utf8_lossy(&out.stdout).into_owned())
}

/// Look for `mountpoint` in `/proc/self/mounts` or BSD `mount` output.
pub fn mount_table_contains(table: &str, mountpoint: &Path) -> bool {
    let target = mountpoint.to_string_lossy();
    table.lines().any(|line| {
        let proc_format = line
            .split_whitespace()
            .nth(1)
            .is_some_and(|field| unescape_octal(field) == target);
        let bsd_format = line
            .split_once(" on ")
            .and_then(|(_, rest)| rest.rsplit_once(" ("))
            .is_some_and(|(path, _)| path == target);
        proc_format || bsd_format
    })
}

/// `/proc/mounts` writes spaces and tabs as `\040` and `\011`.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && let Some(digits) = field.get(i + 1..i + 4)
            && digits.bytes().all(|b| (b'0'..=b'7').contains(&b))
        {
            if let Ok(value) = u8::from_str_radix(digits, 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn failure_reason(status: ExitStatus, log_path: &Path) -> String {
    let log = std::fs::read_to_string(log_path).unwrap_or_default();
    let last = log
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");

    let cause = if log.contains("Permission denied") {
        "authentication failed"
    } else if log.contains("Could not resolve hostname")
        || log.contains("Connection refused")
        || log.contains("Connection timed out")
        || log.contains("No route to host")
    {
        "host unreachable"
    } else if log.contains("No such file or directory") {
        "remote path does not exist"
    } else {
        "sshfs exited"
    };

    if last.is_empty() {
        format!("{cause} ({status})")
    } else {
        format!("{cause}: {last}")
    }
}
