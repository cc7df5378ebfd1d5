// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Image references, box image tags, network ids and configuration names.

mod config_name;
mod id;
mod image_ref;

pub use config_name::{ConfigName, ConfigNameError};
pub use id::{Id, ImageTag, NetworkId};
pub use image_ref::{BOX_IMAGE_PREFIX, ImageRef, ParseImageRefError};
