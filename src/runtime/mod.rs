// ABOUTME: Container runtime access for Docker and Podman.
// ABOUTME: Detection, the bollard client and the capability traits it implements.

mod bollard;
mod detection;
mod error;
mod traits;
mod types;

pub use self::bollard::{BollardRuntime, inventory_name};
pub use detection::{DetectionError, detect_local};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use traits::{
    ImageError, ImageOps, NetworkConfig, NetworkError, NetworkOps, RuntimeInfo as RuntimeInfoTrait,
    RuntimeInfoError, RuntimeMetadata,
};
pub use types::{RuntimeConfig, RuntimeInfo, RuntimeType};

/// Detect and connect to the local runtime, checking it answers.
pub async fn connect_local(config: Option<&RuntimeConfig>) -> Result<BollardRuntime, RuntimeError> {
    let info = detect_local(config)?;
    tracing::debug!("using {} at {}", info.runtime_type, info.socket_path);
    let runtime = BollardRuntime::connect(&info)?;
    RuntimeInfoTrait::ping(&runtime).await?;
    Ok(runtime)
}
