// ABOUTME: Named configuration store backed by a single JSON file.
// ABOUTME: Writes are atomic, unknown fields survive rewrites, corruption is never overwritten.

use chrono::{DateTime, Utc};
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::image::EnvironmentKind;
use crate::mount::MountSpec;
use crate::network::NetworkMode;
use crate::ports::PortMapping;
use crate::types::{ConfigName, ImageTag};

/// File name of the store inside the boxctl home directory.
pub const STORE_FILE: &str = "config.json";

/// Fields this version understands; anything else in a record is carried
/// along untouched.
const KNOWN_FIELDS: &[&str] = &[
    "name",
    "command",
    "environment_kind",
    "version",
    "base_image",
    "mounts",
    "ports",
    "network_mode",
    "image_tag",
    "updated_at",
];

/// A saved run template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedConfiguration {
    pub name: ConfigName,
    #[serde(default)]
    pub command: Vec<String>,
    pub environment_kind: EnvironmentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Image reference, only for the custom environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub network_mode: NetworkMode,
    /// Runtime image this configuration last built.
    pub image_tag: ImageTag,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NamedConfiguration {
    pub fn new(name: ConfigName, environment_kind: EnvironmentKind, image_tag: ImageTag) -> Self {
        Self {
            name,
            command: Vec::new(),
            environment_kind,
            version: None,
            base_image: None,
            mounts: Vec::new(),
            ports: Vec::new(),
            network_mode: NetworkMode::Default,
            image_tag,
            updated_at: Utc::now(),
            extra: Map::new(),
        }
    }
}

/// Result of checking a configuration against the image inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub image_tag: ImageTag,
    pub needs_rebuild: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    images: BTreeMap<String, Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Persistent map from name to [`NamedConfiguration`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store at `path`. Nothing is read or created until first use.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in `home/config.json`.
    pub fn in_home(home: &Path) -> Self {
        Self::open(home.join(STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save under `name`. An existing entry is only replaced with `force`.
    pub fn save(&self, name: &ConfigName, config: &NamedConfiguration, force: bool) -> Result<()> {
        let _lock = self.lock()?;
        let mut file = self.read()?;

        let previous = file.images.get(name.as_str());
        if previous.is_some() && !force {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let mut record = config.clone();
        record.name = name.clone();
        let mut value = serde_json::to_value(&record)?;
        if let (Some(Value::Object(old)), Value::Object(new)) = (previous, &mut value) {
            for (key, field) in old {
                if !KNOWN_FIELDS.contains(&key.as_str()) && !new.contains_key(key) {
                    new.insert(key.clone(), field.clone());
                }
            }
        }

        file.images.insert(name.to_string(), value);
        self.write(&file)?;
        tracing::debug!("saved configuration '{}' to {}", name, self.path.display());
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<NamedConfiguration> {
        let mut file = self.read()?;
        let value = file
            .images
            .remove(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        serde_json::from_value(value).map_err(|e| Error::StoreCorrupted {
            path: self.path.clone(),
            reason: format!("entry '{name}': {e}"),
        })
    }

    /// Names in alphabetical order.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self.read()?.images.into_keys().collect())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let _lock = self.lock()?;
        let mut file = self.read()?;
        if file.images.remove(name).is_none() {
            return Err(Error::NotFound(name.to_string()));
        }
        self.write(&file)?;
        tracing::debug!("deleted configuration '{}'", name);
        Ok(())
    }

    /// Compare the configuration's image with the tags the runtime has.
    pub fn reconcile(config: &NamedConfiguration, inventory: &HashSet<String>) -> Reconciliation {
        let needs_rebuild = !inventory.contains(config.image_tag.as_str());
        Reconciliation {
            image_tag: config.image_tag.clone(),
            needs_rebuild,
        }
    }

    /// Exclusive lock on `config.json.lock`, held for a whole read-modify-write.
    /// Blocks until any other writer is done.
    fn lock(&self) -> Result<Flock<File>> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .mode(0o600)
            .open(self.path.with_extension("json.lock"))?;
        Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| Error::from(io::Error::from(errno)))
    }

    fn read(&self) -> Result<StoreFile> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content).map_err(|e| Error::StoreCorrupted {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn write(&self, file: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));
        let json = serde_json::to_vec_pretty(file)?;
        {
            let mut out = fs::File::create(&tmp)?;
            out.write_all(&json)?;
            out.write_all(b"\n")?;
            out.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn config(name: &str) -> NamedConfiguration {
        let mut cfg = NamedConfiguration::new(
            ConfigName::new(name).unwrap(),
            EnvironmentKind::Node,
            ImageTag::new(format!("box-named-{name}")),
        );
        cfg.command = vec!["npm".into(), "test".into()];
        cfg
    }

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::in_home(dir.path());
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.load("x").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn unreadable_entry_is_reported_as_corruption() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::in_home(dir.path());
        fs::write(store.path(), r#"{"images": {"bad": {"name": "bad"}}}"#).unwrap();
        assert_eq!(store.load("bad").unwrap_err().kind(), ErrorKind::StoreCorrupted);
        assert_eq!(store.list().unwrap(), vec!["bad"]);
    }

    #[test]
    fn write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::in_home(dir.path());
        let cfg = config("api");
        store.save(&cfg.name, &cfg, false).unwrap();
        assert!(store.path().exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn save_stores_under_the_given_name() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::in_home(dir.path());
        let cfg = config("api");
        let other = ConfigName::new("web").unwrap();
        store.save(&other, &cfg, false).unwrap();
        assert_eq!(store.load("web").unwrap().name, other);
    }

    #[test]
    fn reconcile_checks_inventory() {
        let cfg = config("api");
        let present: HashSet<String> = ["box-named-api".to_string()].into();
        let absent: HashSet<String> = HashSet::new();
        assert!(!ConfigStore::reconcile(&cfg, &present).needs_rebuild);
        let r = ConfigStore::reconcile(&cfg, &absent);
        assert!(r.needs_rebuild);
        assert_eq!(r.image_tag.as_str(), "box-named-api");
    }
}
