// ABOUTME: Tool settings from settings.yml in the boxctl home directory.
// ABOUTME: Runtime override, ssh mount cache root, timeouts and default proxy.

use crate::error::{Error, Result};
use crate::runtime::RuntimeConfig;
use crate::sshfs::{MountTimeouts, default_cache_root};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILENAME: &str = "settings.yml";
pub const SETTINGS_FILENAME_ALT: &str = "settings.yaml";

/// Environment variable that relocates the boxctl home directory.
pub const HOME_ENV: &str = "BOXCTL_HOME";
const DEFAULT_HOME_DIR: &str = ".box-cli";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// `runtime` and `socket` keys.
    #[serde(flatten)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub cache_root: Option<PathBuf>,

    #[serde(default = "default_mount_timeout", with = "humantime_serde")]
    pub mount_timeout: Duration,

    #[serde(default = "default_unmount_timeout", with = "humantime_serde")]
    pub unmount_timeout: Duration,

    #[serde(default = "default_lock_timeout", with = "humantime_serde")]
    pub lock_timeout: Duration,

    /// Proxy used by `--proxy` when no endpoint is given.
    #[serde(default)]
    pub http_proxy: Option<String>,
}

fn default_mount_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_unmount_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            cache_root: None,
            mount_timeout: default_mount_timeout(),
            unmount_timeout: default_unmount_timeout(),
            lock_timeout: default_lock_timeout(),
            http_proxy: None,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Settings from `home`, or defaults when no settings file exists.
    pub fn discover(home: &Path) -> Result<Self> {
        let candidates = [home.join(SETTINGS_FILENAME), home.join(SETTINGS_FILENAME_ALT)];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("loading settings from {}", path.display());
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mount_timeout", self.mount_timeout),
            ("unmount_timeout", self.unmount_timeout),
            ("lock_timeout", self.lock_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }
        if self.runtime.socket.is_some() && self.runtime.runtime.is_none() {
            return Err(Error::config("socket requires runtime to be set"));
        }
        Ok(())
    }

    pub fn timeouts(&self) -> MountTimeouts {
        MountTimeouts {
            mount: self.mount_timeout,
            unmount: self.unmount_timeout,
            lock: self.lock_timeout,
        }
    }

    pub fn cache_root(&self) -> PathBuf {
        self.cache_root.clone().unwrap_or_else(default_cache_root)
    }

    /// The runtime override, if settings name a runtime.
    pub fn runtime_override(&self) -> Option<&RuntimeConfig> {
        self.runtime.runtime.map(|_| &self.runtime)
    }
}

/// The boxctl home directory: `$BOXCTL_HOME`, else `~/.box-cli`.
pub fn home_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_HOME_DIR))
        .ok_or_else(|| Error::config(format!("cannot find a home directory, set {HOME_ENV}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::runtime::RuntimeType;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_yaml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.timeouts(), MountTimeouts::default());
        assert!(settings.runtime_override().is_none());
    }

    #[test]
    fn parses_all_keys() {
        let yaml = r#"
runtime: podman
socket: /run/user/1000/podman/podman.sock
cache_root: /var/tmp/box-mounts
mount_timeout: 30s
unmount_timeout: 5s
lock_timeout: 1m
http_proxy: proxy.lan:3128
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.runtime.runtime, Some(RuntimeType::Podman));
        assert_eq!(settings.cache_root(), PathBuf::from("/var/tmp/box-mounts"));
        assert_eq!(settings.mount_timeout, Duration::from_secs(30));
        assert_eq!(settings.lock_timeout, Duration::from_secs(60));
        assert_eq!(settings.http_proxy.as_deref(), Some("proxy.lan:3128"));
        assert!(settings.runtime_override().is_some());
    }

    #[test]
    fn rejects_zero_timeouts() {
        let err = Settings::from_yaml("mount_timeout: 0s").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn rejects_bad_durations() {
        let err = Settings::from_yaml("mount_timeout: soon").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn socket_without_runtime_is_rejected() {
        assert!(Settings::from_yaml("socket: /tmp/x.sock").is_err());
    }

    #[test]
    fn default_cache_root_is_user_scoped() {
        let root = Settings::default().cache_root();
        assert!(root.ends_with("ssh-mounts"));
        assert!(root.starts_with(std::env::temp_dir()));
    }
}
