// ABOUTME: Run configuration: raw command line input parsed into validated parts.
// ABOUTME: Parsing has no side effects; named configurations merge in here.

use serde_json::Map;

use crate::error::{Error, Result};
use crate::image::{self, EnvironmentKind};
use crate::mount::{MountMode, MountSpec, ParseContext};
use crate::network::{NetworkFlags, NetworkMode};
use crate::ports::PortMapping;
use crate::store::NamedConfiguration;
use crate::types::{ConfigName, ImageTag};

/// Run parameters as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    /// Mount tokens with their mode, in command line order.
    pub mounts: Vec<(String, MountMode)>,
    pub ports: Vec<String>,
    pub network: NetworkFlags,
    pub command: Vec<String>,
    /// Explicit environment; detected when absent.
    pub environment: Option<EnvironmentKind>,
    pub version: Option<String>,
    /// Custom base image; implies the custom environment.
    pub image: Option<String>,
    /// Proxy endpoint used when `--proxy` has no value.
    pub fallback_proxy: Option<String>,
}

/// A validated run configuration, not yet touching any resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    pub mounts: Vec<MountSpec>,
    pub ports: Vec<PortMapping>,
    pub network: NetworkMode,
    pub command: Vec<String>,
    pub environment: Option<EnvironmentKind>,
    pub version: Option<String>,
    pub custom_image: Option<String>,
    /// Set for named runs; the image is then `box-named-<name>`.
    pub name: Option<ConfigName>,
    /// Fields of a loaded named configuration this version does not know.
    pub extra: Map<String, serde_json::Value>,
}

impl RunConfiguration {
    /// Parse and validate everything the command line gave.
    pub fn parse(input: &RunInput, ctx: &ParseContext) -> Result<Self> {
        let mounts = MountSpec::parse_all(
            input.mounts.iter().map(|(token, mode)| (token.as_str(), *mode)),
            ctx,
        )?;
        let ports = PortMapping::parse_all(&input.ports)?;
        let network = NetworkMode::select(&input.network, input.fallback_proxy.as_deref())?;

        let environment = match (&input.image, input.environment) {
            (Some(_), Some(kind)) if kind != EnvironmentKind::Custom => {
                return Err(Error::config(format!(
                    "--image cannot be combined with the {kind} environment"
                )));
            }
            (Some(_), _) => Some(EnvironmentKind::Custom),
            (None, kind) => kind,
        };

        let config = Self {
            mounts,
            ports,
            network,
            command: input.command.clone(),
            environment,
            version: input.version.clone(),
            custom_image: input.image.clone(),
            name: None,
            extra: Map::new(),
        };
        config.validate_image()?;
        Ok(config)
    }

    /// Start from a saved configuration and layer the command line on top:
    /// saved mounts and ports come first, the saved command is used when
    /// none is given, and the network mode changes only if a flag says so.
    pub fn from_named(
        saved: &NamedConfiguration,
        input: &RunInput,
        ctx: &ParseContext,
    ) -> Result<Self> {
        let given = Self::parse(input, ctx)?;

        let mut mounts: Vec<MountSpec> = saved.mounts.clone();
        mounts.extend(given.mounts);
        for (order, spec) in mounts.iter_mut().enumerate() {
            spec.order = order;
        }

        let mut ports = saved.ports.clone();
        ports.extend(given.ports);

        let command = if given.command.is_empty() {
            saved.command.clone()
        } else {
            given.command
        };

        let network = if input.network.is_empty() {
            saved.network_mode.clone()
        } else {
            given.network
        };

        let (environment, version, custom_image) = match given.environment {
            Some(kind) => (Some(kind), given.version, given.custom_image),
            None => (
                Some(saved.environment_kind),
                given.version.or_else(|| saved.version.clone()),
                saved.base_image.clone(),
            ),
        };

        let config = Self {
            mounts,
            ports,
            network,
            command,
            environment,
            version,
            custom_image,
            name: Some(saved.name.clone()),
            extra: saved.extra.clone(),
        };
        config.validate_image()?;
        Ok(config)
    }

    /// Mark this run as the named configuration `name`.
    pub fn named(mut self, name: ConfigName) -> Self {
        self.name = Some(name);
        self
    }

    /// Snapshot to persist for a named run.
    pub fn to_named(
        &self,
        environment_kind: EnvironmentKind,
        image_tag: ImageTag,
    ) -> Option<NamedConfiguration> {
        let name = self.name.clone()?;
        let mut saved = NamedConfiguration::new(name, environment_kind, image_tag);
        saved.command = self.command.clone();
        saved.version = self.version.clone();
        saved.base_image = self.custom_image.clone();
        saved.mounts = self.mounts.clone();
        saved.ports = self.ports.clone();
        saved.network_mode = self.network.clone();
        saved.extra = self.extra.clone();
        Some(saved)
    }

    fn validate_image(&self) -> Result<()> {
        // auto-detected runs check the version against any official image
        let kind = self.environment.unwrap_or(EnvironmentKind::Alpine);
        image::base_image(kind, self.version.as_deref(), self.custom_image.as_deref()).map(|_| ())
    }
}
