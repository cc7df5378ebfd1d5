// ABOUTME: Library root for boxctl - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod assemble;
pub mod diagnostics;
pub mod error;
pub mod image;
pub mod mount;
pub mod network;
pub mod output;
pub mod ports;
pub mod runtime;
pub mod settings;
pub mod sshfs;
pub mod store;
pub mod types;
