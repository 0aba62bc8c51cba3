use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BootError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("Git Error: {0}")]
    Git(#[from] Arc<git2::Error>),

    #[error("Config File Parse Error: {0}")]
    TomlParse(#[from] Arc<toml::de::Error>),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Privilege Error: {0}")]
    PrivilegeDenied(String),

    #[error("Command `{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Installation Error: {0}")]
    Install(String),

    #[error("Source Sync Error: {0}")]
    Sync(String),

    #[error("Launcher Error: {0}")]
    Launcher(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Checksum Mismatch: {0}")]
    Checksum(String),

    /// The server answered, but not with success.
    #[error("HttpError: {0}")]
    HttpError(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for BootError {
    fn from(err: std::io::Error) -> Self {
        BootError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for BootError {
    fn from(err: reqwest::Error) -> Self {
        BootError::Http(Arc::new(err))
    }
}

impl From<git2::Error> for BootError {
    fn from(err: git2::Error) -> Self {
        BootError::Git(Arc::new(err))
    }
}

impl From<toml::de::Error> for BootError {
    fn from(err: toml::de::Error) -> Self {
        BootError::TomlParse(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, BootError>;
