// ABOUTME: Deterministic directory names for mounts under the cache root.
// ABOUTME: Names are injective so distinct endpoints never share a mountpoint.

use crate::mount::{MountMode, RemoteEndpoint};
use sha2::{Digest, Sha256};
use std::fmt::Write;
use std::path::Path;

/// Prefix for mounts placed at a caller chosen path instead of the cache root.
pub const CUSTOM_PREFIX: &str = "custom-";

/// Longest name handed out. Leaves room for the `.json` and `.log` siblings
/// under the usual 255 byte file name limit.
pub const MAX_NAME_LEN: usize = 200;

/// Hex digits of the digest appended to a shortened name.
const DIGEST_LEN: usize = 16;

/// `{ro|rw}-{user}@{host}+{path}` with each part escaped.
///
/// `@` and `+` never survive escaping, so the separators are unambiguous and
/// two different (endpoint, mode) pairs always get different names.
pub fn mount_name(endpoint: &RemoteEndpoint, mode: MountMode) -> String {
    bounded(format!(
        "{}-{}@{}+{}",
        mode.as_flag(),
        escape(&endpoint.user),
        escape(&endpoint.host),
        escape(&endpoint.path)
    ))
}

/// Registry name for a mount at an explicit local path.
pub fn custom_mount_name(mountpoint: &Path) -> String {
    bounded(format!(
        "{CUSTOM_PREFIX}{}",
        escape(&mountpoint.to_string_lossy())
    ))
}

/// Cut names over [`MAX_NAME_LEN`] and append `~` plus a digest of the full
/// name. Escaped names never contain `~`, so a shortened name cannot equal
/// one that was left alone.
fn bounded(name: String) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name;
    }
    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    let mut keep = MAX_NAME_LEN - DIGEST_LEN - 1;
    while !name.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}~{}", &name[..keep], &digest[..DIGEST_LEN])
}

fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for byte in part.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' => out.push(byte as char),
            b'/' => out.push('_'),
            other => {
                let _ = write!(out, "%{other:02X}");
            }
        }
    }
    out
}
