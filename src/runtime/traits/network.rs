// ABOUTME: Network operations trait for container runtimes.
// ABOUTME: Check for and create networks.

use crate::types::NetworkId;
use async_trait::async_trait;
use std::collections::HashMap;

/// Configuration for creating a network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Network name.
    pub name: String,
    /// Network driver (bridge when unset).
    pub driver: Option<String>,
    /// No route to the outside world.
    pub internal: bool,
    /// Labels.
    pub labels: HashMap<String, String>,
}

/// Network operations.
#[async_trait]
pub trait NetworkOps: Send + Sync {
    /// Create a network.
    async fn create_network(&self, config: &NetworkConfig) -> Result<NetworkId, NetworkError>;

    /// Check if a network exists.
    async fn network_exists(&self, name: &str) -> Result<bool, NetworkError>;
}

/// Errors from network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("network not found: {0}")]
    NotFound(String),

    #[error("network already exists: {0}")]
    AlreadyExists(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<NetworkError> for crate::error::Error {
    fn from(err: NetworkError) -> Self {
        crate::error::Error::Runtime(err.to_string())
    }
}
