// deskboot-common/src/lib.rs
pub mod config;
pub mod error;
pub mod host;

// Re-export key types
pub use config::Config;
pub use error::{BootError, Result};
pub use host::{CommandOutput, CommandSpec, Host, Privilege};
