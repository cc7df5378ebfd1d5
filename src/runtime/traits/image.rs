// ABOUTME: Image operations trait for container runtimes.
// ABOUTME: Inventory listing, existence checks, pulls and removal.

use crate::types::ImageRef;
use async_trait::async_trait;
use std::collections::HashSet;

/// Image operations: inventory, pull, remove.
#[async_trait]
pub trait ImageOps: Send + Sync {
    /// Local image names starting with `prefix`, without the `:latest` tag
    /// and without a `localhost/` registry.
    async fn list_image_tags(&self, prefix: &str) -> Result<HashSet<String>, ImageError>;

    /// Check if an image exists locally.
    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError>;

    /// Pull an image from a registry.
    async fn pull_image(&self, reference: &ImageRef) -> Result<(), ImageError>;

    /// Remove an image by name or tag.
    async fn remove_image(&self, name: &str, force: bool) -> Result<(), ImageError>;
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("image in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl From<ImageError> for crate::error::Error {
    fn from(err: ImageError) -> Self {
        crate::error::Error::Runtime(err.to_string())
    }
}
