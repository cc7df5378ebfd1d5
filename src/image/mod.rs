// ABOUTME: Chooses the base image for a run and names the box image built on it.
// ABOUTME: Environment detection is a pure function of the command and directory listing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{BOX_IMAGE_PREFIX, ConfigName, ImageRef, ImageTag};

const NODE_COMMANDS: &[&str] = &[
    "npm", "npx", "yarn", "pnpm", "node", "nodejs", "webpack", "vite", "next", "nuxt", "gatsby",
    "react-scripts", "vue-cli-service", "ng", "angular", "tsc", "ts-node", "eslint", "prettier",
    "jest",
];

const PYTHON_COMMANDS: &[&str] = &[
    "python", "python3", "pip", "pip3", "pipenv", "poetry", "pytest", "black", "flake8", "mypy",
    "pylint", "django-admin", "flask", "gunicorn", "uvicorn", "jupyter", "ipython", "conda",
    "mamba",
];

const SHELLS: &[&str] = &["bash", "sh", "zsh"];

const NODE_MARKERS: &[&str] = &["package.json", "yarn.lock", "pnpm-lock.yaml"];

const PYTHON_MARKERS: &[&str] = &[
    "requirements.txt",
    "pyproject.toml",
    "setup.py",
    "Pipfile",
    "poetry.lock",
];

/// Prefix of images built for named configurations.
pub const NAMED_IMAGE_PREFIX: &str = "box-named-";

/// Language environment a run is built on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentKind {
    Node,
    Python,
    #[default]
    Alpine,
    Custom,
}

impl EnvironmentKind {
    /// Guess the environment from the command, and for plain shells from
    /// project files among `entries` (top-level names of the working
    /// directory). Falls back to alpine.
    pub fn detect<S: AsRef<str>>(command: &[String], entries: &[S]) -> Self {
        let Some(first) = command.first() else {
            return EnvironmentKind::Alpine;
        };
        let program = first.rsplit('/').next().unwrap_or(first).to_lowercase();

        if NODE_COMMANDS.contains(&program.as_str()) {
            return EnvironmentKind::Node;
        }
        if PYTHON_COMMANDS.contains(&program.as_str()) {
            return EnvironmentKind::Python;
        }

        if SHELLS.contains(&program.as_str()) {
            let has = |markers: &[&str]| {
                entries
                    .iter()
                    .any(|entry| markers.contains(&entry.as_ref()))
            };
            if has(NODE_MARKERS) {
                return EnvironmentKind::Node;
            }
            if has(PYTHON_MARKERS) {
                return EnvironmentKind::Python;
            }
        }

        EnvironmentKind::Alpine
    }

    /// Tag used when no version is given.
    pub fn default_version(&self) -> &'static str {
        match self {
            EnvironmentKind::Node => "lts",
            EnvironmentKind::Python | EnvironmentKind::Alpine | EnvironmentKind::Custom => {
                "latest"
            }
        }
    }

    fn image_name(&self) -> Option<&'static str> {
        match self {
            EnvironmentKind::Node => Some("node"),
            EnvironmentKind::Python => Some("python"),
            EnvironmentKind::Alpine => Some("alpine"),
            EnvironmentKind::Custom => None,
        }
    }
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnvironmentKind::Node => "node",
            EnvironmentKind::Python => "python",
            EnvironmentKind::Alpine => "alpine",
            EnvironmentKind::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// Top-level entry names of `dir`, sorted. Unreadable directories yield
/// nothing, which makes detection fall back to alpine.
pub fn list_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// The base image for `kind` at `version`. `custom` must name an image.
pub fn base_image(
    kind: EnvironmentKind,
    version: Option<&str>,
    custom: Option<&str>,
) -> Result<ImageRef> {
    let reference = match (kind.image_name(), custom) {
        (Some(name), _) => {
            ImageRef::official(name, version.unwrap_or(kind.default_version()))
        }
        (None, Some(image)) => ImageRef::parse(image),
        (None, None) => return Err(Error::config("custom environment needs an --image")),
    };
    reference.map_err(|e| Error::config(format!("invalid base image: {e}")))
}

/// Box image tag for an ad hoc run: `box-<base with separators dashed>`.
pub fn adhoc_image_tag(base: &ImageRef) -> ImageTag {
    base.box_image_tag()
}

/// Box image tag for a named configuration: `box-named-<name>`.
pub fn named_image_tag(name: &ConfigName) -> ImageTag {
    ImageTag::new(format!("{NAMED_IMAGE_PREFIX}{name}"))
}

/// Whether `tag` is an image this tool built.
pub fn is_box_image(tag: &str) -> bool {
    tag.starts_with(BOX_IMAGE_PREFIX)
}

/// Dockerfile for a box image: the base plus bash, working in `/root`.
pub fn dockerfile(base: &ImageRef) -> String {
    let install = if base.is_alpine() {
        "RUN apk add --no-cache bash\n"
    } else {
        ""
    };
    format!("FROM {base}\n{install}WORKDIR /root\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    const NONE: &[&str] = &[];

    #[test]
    fn detects_from_the_first_command_word() {
        assert_eq!(EnvironmentKind::detect(&cmd(&["npm", "test"]), NONE), EnvironmentKind::Node);
        assert_eq!(EnvironmentKind::detect(&cmd(&["pytest", "-q"]), NONE), EnvironmentKind::Python);
        assert_eq!(
            EnvironmentKind::detect(&cmd(&["/usr/bin/python3"]), NONE),
            EnvironmentKind::Python
        );
        assert_eq!(EnvironmentKind::detect(&cmd(&["make"]), NONE), EnvironmentKind::Alpine);
        assert_eq!(EnvironmentKind::detect(&cmd(&[]), NONE), EnvironmentKind::Alpine);
    }

    #[test]
    fn shells_look_at_project_files() {
        assert_eq!(
            EnvironmentKind::detect(&cmd(&["bash"]), &["src", "package.json"]),
            EnvironmentKind::Node
        );
        assert_eq!(
            EnvironmentKind::detect(&cmd(&["sh"]), &["pyproject.toml"]),
            EnvironmentKind::Python
        );
        assert_eq!(
            EnvironmentKind::detect(&cmd(&["zsh"]), &["README.md"]),
            EnvironmentKind::Alpine
        );
    }

    #[test]
    fn project_files_are_ignored_for_other_commands() {
        assert_eq!(
            EnvironmentKind::detect(&cmd(&["make"]), &["package.json"]),
            EnvironmentKind::Alpine
        );
    }

    #[test]
    fn base_images_default_their_versions() {
        assert_eq!(
            base_image(EnvironmentKind::Node, None, None).unwrap().to_string(),
            "node:lts"
        );
        assert_eq!(
            base_image(EnvironmentKind::Python, Some("3.12"), None)
                .unwrap()
                .to_string(),
            "python:3.12"
        );
        assert_eq!(
            base_image(EnvironmentKind::Alpine, None, None).unwrap().to_string(),
            "alpine:latest"
        );
    }

    #[test]
    fn custom_needs_an_image() {
        assert!(base_image(EnvironmentKind::Custom, None, None).is_err());
        assert_eq!(
            base_image(EnvironmentKind::Custom, None, Some("ghcr.io/org/tools:1"))
                .unwrap()
                .to_string(),
            "ghcr.io/org/tools:1"
        );
    }

    #[test]
    fn image_tags() {
        let base = base_image(EnvironmentKind::Node, Some("18"), None).unwrap();
        assert_eq!(adhoc_image_tag(&base).as_str(), "box-node-18");
        let name = ConfigName::new("api").unwrap();
        assert_eq!(named_image_tag(&name).as_str(), "box-named-api");
        assert!(is_box_image("box-named-api"));
        assert!(!is_box_image("node"));
    }

    #[test]
    fn dockerfile_installs_bash_on_alpine_only() {
        let alpine = ImageRef::parse("alpine:3.19").unwrap();
        assert_eq!(
            dockerfile(&alpine),
            "FROM alpine:3.19\nRUN apk add --no-cache bash\nWORKDIR /root\n"
        );
        let node = ImageRef::parse("node:lts").unwrap();
        assert_eq!(dockerfile(&node), "FROM node:lts\nWORKDIR /root\n");
    }

    #[test]
    fn list_entries_reads_top_level_names() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        assert_eq!(list_entries(dir.path()), vec!["package.json", "src"]);
        assert!(list_entries(&dir.path().join("missing")).is_empty());
    }
}
