// ABOUTME: Capability traits for container runtimes.
// ABOUTME: Defines ImageOps, NetworkOps and RuntimeInfo.

mod image;
mod network;
mod runtime_info;

pub use image::{ImageError, ImageOps};
pub use network::{NetworkConfig, NetworkError, NetworkOps};
pub use runtime_info::{RuntimeInfo, RuntimeInfoError, RuntimeMetadata};
