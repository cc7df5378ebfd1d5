// ABOUTME: Network isolation modes and the runtime arguments each one needs.
// ABOUTME: Mapping is pure; only the internal network may require a create call.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{Error, Result};
use crate::runtime::{NetworkConfig, NetworkError, NetworkOps};
use crate::types::NetworkId;

/// Well-known name of the isolated bridge network shared by all runs.
pub const INTERNAL_NETWORK: &str = "box-internal";

const PROXY_VARS: [&str; 4] = ["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"];

/// How a run's container reaches the network. Exactly one per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum NetworkMode {
    /// The runtime's default network.
    #[default]
    Default,
    /// No network at all.
    None,
    /// Isolated bridge network without an external route.
    Internal,
    /// Egress through an HTTP proxy at `endpoint` (`host:port`).
    Proxied { endpoint: String },
}

/// Network flags as given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkFlags {
    pub none: bool,
    pub internal: bool,
    /// `Some(None)` when proxying was asked for without an endpoint.
    pub proxy: Option<Option<String>>,
}

impl NetworkFlags {
    pub fn is_empty(&self) -> bool {
        !self.none && !self.internal && self.proxy.is_none()
    }
}

impl NetworkMode {
    /// Pick the single mode the flags ask for.
    ///
    /// `fallback_proxy` is used when proxying is requested without an
    /// endpoint (typically from settings).
    pub fn select(flags: &NetworkFlags, fallback_proxy: Option<&str>) -> Result<Self> {
        let requested = [flags.none, flags.internal, flags.proxy.is_some()]
            .iter()
            .filter(|set| **set)
            .count();
        if requested > 1 {
            return Err(Error::config(
                "network modes are mutually exclusive: pick one of --no-network, --internal, --proxy",
            ));
        }

        if flags.none {
            return Ok(NetworkMode::None);
        }
        if flags.internal {
            return Ok(NetworkMode::Internal);
        }
        match &flags.proxy {
            Some(endpoint) => {
                let endpoint = endpoint
                    .as_deref()
                    .or(fallback_proxy)
                    .ok_or_else(|| Error::config("proxied network mode needs a proxy endpoint"))?;
                Ok(NetworkMode::Proxied {
                    endpoint: validate_proxy(endpoint)?,
                })
            }
            None => Ok(NetworkMode::Default),
        }
    }

    /// Runtime arguments, environment and prerequisites for this mode.
    pub fn plan(&self) -> NetworkPlan {
        match self {
            NetworkMode::Default => NetworkPlan::default(),
            NetworkMode::None => NetworkPlan {
                args: vec!["--network".into(), "none".into()],
                ..Default::default()
            },
            NetworkMode::Internal => NetworkPlan {
                args: vec!["--network".into(), INTERNAL_NETWORK.into()],
                ensure_network: Some(NetworkId::new(INTERNAL_NETWORK)),
                ..Default::default()
            },
            NetworkMode::Proxied { endpoint } => {
                let url = proxy_url(endpoint);
                NetworkPlan {
                    env: PROXY_VARS
                        .iter()
                        .map(|var| (var.to_string(), url.clone()))
                        .collect(),
                    ..Default::default()
                }
            }
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMode::Default => f.write_str("default"),
            NetworkMode::None => f.write_str("none"),
            NetworkMode::Internal => f.write_str("internal"),
            NetworkMode::Proxied { endpoint } => write!(f, "proxied via {endpoint}"),
        }
    }
}

/// What a run needs from the runtime to honor its network mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkPlan {
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Network that has to exist before the container starts.
    pub ensure_network: Option<NetworkId>,
}

/// Create the plan's network if it is missing. A concurrent create by
/// another invocation counts as success.
pub async fn ensure_network<N>(plan: &NetworkPlan, runtime: &N) -> Result<()>
where
    N: NetworkOps + ?Sized,
{
    let Some(network) = &plan.ensure_network else {
        return Ok(());
    };

    if runtime.network_exists(network.as_str()).await? {
        tracing::debug!("network {} already exists", network);
        return Ok(());
    }

    let config = NetworkConfig {
        name: network.to_string(),
        driver: Some("bridge".to_string()),
        internal: true,
        labels: HashMap::from([("managed-by".to_string(), "boxctl".to_string())]),
    };
    match runtime.create_network(&config).await {
        Ok(id) => {
            tracing::debug!("created internal network {} ({})", network, id);
            Ok(())
        }
        Err(NetworkError::AlreadyExists(_)) => {
            tracing::debug!("network {} was created concurrently", network);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn validate_proxy(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    let bare = endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"))
        .unwrap_or(endpoint)
        .trim_end_matches('/');
    let valid = bare
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p > 0));
    if valid {
        Ok(endpoint.to_string())
    } else {
        Err(Error::config(format!(
            "proxy endpoint '{endpoint}' must be host:port"
        )))
    }
}

fn proxy_url(endpoint: &str) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}
