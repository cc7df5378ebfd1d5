// ABOUTME: Parses raw mount tokens into structured mount specifications.
// ABOUTME: Handles local[:container] and user@host:path[:container] forms.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Home directory of the container user; derived mount targets live here.
pub const CONTAINER_HOME: &str = "/root";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MountSpecError {
    #[error("path cannot be empty")]
    Empty,

    #[error("unsupported scheme '{0}://'")]
    UnsupportedScheme(String),

    #[error("too many ':' separated fields")]
    TooManyFields,

    #[error("remote spec is missing a user before '@'")]
    MissingUser,

    #[error("remote spec is missing a host")]
    MissingHost,

    #[error("remote spec is missing a path after the host")]
    MissingRemotePath,

    #[error("invalid host name '{0}'")]
    InvalidHost(String),

    #[error("container path cannot be empty")]
    EmptyContainerPath,

    #[error("invalid container path '{path}': {reason}")]
    InvalidContainerPath { path: String, reason: String },

    #[error("cannot derive a container path from '{0}', give one explicitly")]
    NoBasename(String),

    #[error("cannot expand '~': home directory is unknown")]
    NoHome,
}

/// Access mode of a mount inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountMode {
    ReadOnly,
    ReadWrite,
}

impl MountMode {
    /// Short option form used by runtimes and sshfs (`ro` / `rw`).
    pub fn as_flag(&self) -> &'static str {
        match self {
            MountMode::ReadOnly => "ro",
            MountMode::ReadWrite => "rw",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, MountMode::ReadOnly)
    }
}

impl fmt::Display for MountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountMode::ReadOnly => f.write_str("read-only"),
            MountMode::ReadWrite => f.write_str("read-write"),
        }
    }
}

/// A remote directory reachable over SSH.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    pub user: String,
    pub host: String,
    pub path: String,
}

impl RemoteEndpoint {
    /// Parse `user@host:path`. Extra `:` fields are rejected.
    pub fn parse(spec: &str) -> std::result::Result<Self, MountSpecError> {
        let (endpoint, container) = parse_remote(spec.trim())?;
        if container.is_some() {
            return Err(MountSpecError::TooManyFields);
        }
        Ok(endpoint)
    }

    /// Name used when no container path is given: the last path component,
    /// or the host when the path has none (`/`, `~`).
    pub fn basename(&self) -> &str {
        match self.path.trim_end_matches('/').rsplit('/').next() {
            Some(name) if !matches!(name, "" | "~" | "." | "..") => name,
            _ => &self.host,
        }
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.path)
    }
}

/// Where the mounted data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MountSource {
    Local { path: PathBuf },
    Remote(RemoteEndpoint),
}

impl fmt::Display for MountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountSource::Local { path } => write!(f, "{}", path.display()),
            MountSource::Remote(endpoint) => write!(f, "{endpoint}"),
        }
    }
}

/// Directories a mount token is resolved against. Captured once per
/// invocation so a later change of directory does not move relative mounts.
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub cwd: PathBuf,
    pub home: Option<PathBuf>,
}

impl ParseContext {
    pub fn new(cwd: impl Into<PathBuf>, home: Option<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            home,
        }
    }

    pub fn current() -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?, dirs::home_dir()))
    }
}

/// A parsed, not yet resolved request to expose a path inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    pub source: MountSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_path: Option<String>,
    pub mode: MountMode,
    #[serde(default)]
    pub order: usize,
}

impl MountSpec {
    /// Parse one raw token. Never touches the filesystem.
    pub fn parse(token: &str, mode: MountMode, order: usize, ctx: &ParseContext) -> Result<Self> {
        Self::parse_inner(token, mode, order, ctx).map_err(|source| Error::MalformedMountSpec {
            token: token.to_string(),
            source,
        })
    }

    fn parse_inner(
        token: &str,
        mode: MountMode,
        order: usize,
        ctx: &ParseContext,
    ) -> std::result::Result<Self, MountSpecError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(MountSpecError::Empty);
        }
        if let Some((scheme, _)) = token.split_once("://") {
            return Err(MountSpecError::UnsupportedScheme(scheme.to_string()));
        }

        let (source, container) = if is_remote(token) {
            let (endpoint, container) = parse_remote(token)?;
            (MountSource::Remote(endpoint), container)
        } else {
            let mut fields = token.split(':');
            let path = fields.next().unwrap_or_default();
            let container = fields.next();
            if fields.next().is_some() {
                return Err(MountSpecError::TooManyFields);
            }
            if path.is_empty() {
                return Err(MountSpecError::Empty);
            }
            let path = resolve_local(path, ctx)?;
            (MountSource::Local { path }, container)
        };

        let container_path = container.map(normalize_container_path).transpose()?;

        let spec = Self {
            source,
            container_path,
            mode,
            order,
        };
        // Fail now rather than at resolution time when nothing can be derived.
        if spec.container_path.is_none() && spec.derived_name().is_none() {
            return Err(MountSpecError::NoBasename(spec.source.to_string()));
        }
        Ok(spec)
    }

    /// Parse tokens in order, numbering them from zero.
    pub fn parse_all<'a, I>(tokens: I, ctx: &ParseContext) -> Result<Vec<Self>>
    where
        I: IntoIterator<Item = (&'a str, MountMode)>,
    {
        tokens
            .into_iter()
            .enumerate()
            .map(|(order, (token, mode))| Self::parse(token, mode, order, ctx))
            .collect()
    }

    pub fn remote(&self) -> Option<&RemoteEndpoint> {
        match &self.source {
            MountSource::Remote(endpoint) => Some(endpoint),
            MountSource::Local { .. } => None,
        }
    }

    /// Final path inside the container: the explicit one, or
    /// `/root/<last component of the source>`.
    pub fn target(&self) -> String {
        match (&self.container_path, self.derived_name()) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(name)) => format!("{CONTAINER_HOME}/{name}"),
            // parse() rejects specs without either
            (None, None) => CONTAINER_HOME.to_string(),
        }
    }

    fn derived_name(&self) -> Option<String> {
        match &self.source {
            MountSource::Local { path } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            MountSource::Remote(endpoint) => Some(endpoint.basename().to_string()),
        }
    }
}

/// A token is remote when an `@` shows up before the first `:`.
fn is_remote(token: &str) -> bool {
    match (token.find('@'), token.find(':')) {
        (Some(at), Some(colon)) => at < colon,
        _ => false,
    }
}

fn parse_remote(
    token: &str,
) -> std::result::Result<(RemoteEndpoint, Option<&str>), MountSpecError> {
    let (user, rest) = token.split_once('@').ok_or(MountSpecError::MissingUser)?;
    if user.is_empty() {
        return Err(MountSpecError::MissingUser);
    }

    let mut fields = rest.split(':');
    let host = fields.next().unwrap_or_default();
    let path = fields.next().ok_or(MountSpecError::MissingRemotePath)?;
    let container = fields.next();
    if fields.next().is_some() {
        return Err(MountSpecError::TooManyFields);
    }

    if host.is_empty() {
        return Err(MountSpecError::MissingHost);
    }
    if host.contains(['@', '/']) || host.chars().any(char::is_whitespace) {
        return Err(MountSpecError::InvalidHost(host.to_string()));
    }
    if path.is_empty() {
        return Err(MountSpecError::MissingRemotePath);
    }

    Ok((
        RemoteEndpoint {
            user: user.to_string(),
            host: host.to_string(),
            path: path.to_string(),
        },
        container,
    ))
}

fn resolve_local(raw: &str, ctx: &ParseContext) -> std::result::Result<PathBuf, MountSpecError> {
    let expanded = if raw == "~" || raw.starts_with("~/") {
        let home = ctx.home.as_ref().ok_or(MountSpecError::NoHome)?;
        home.join(raw.trim_start_matches('~').trim_start_matches('/'))
    } else {
        PathBuf::from(raw)
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        ctx.cwd.join(expanded)
    };
    Ok(normalize_lexically(&absolute))
}

/// Resolve `.` and `..` without consulting the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn normalize_container_path(raw: &str) -> std::result::Result<String, MountSpecError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MountSpecError::EmptyContainerPath);
    }

    let invalid = |reason: &str| MountSpecError::InvalidContainerPath {
        path: raw.to_string(),
        reason: reason.to_string(),
    };

    if let Some(c) = raw
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '/' | '.' | '_' | '-' | '+' | '@' | '~'))
    {
        return Err(invalid(&format!("character '{c}' is not allowed")));
    }

    let parts: Vec<&str> = raw
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    if parts.contains(&"..") {
        return Err(invalid("'..' is not allowed"));
    }
    if parts.is_empty() {
        return Err(invalid("cannot mount over /"));
    }

    let joined = parts.join("/");
    if raw.starts_with('/') {
        Ok(format!("/{joined}"))
    } else {
        Ok(format!("{CONTAINER_HOME}/{joined}"))
    }
}
