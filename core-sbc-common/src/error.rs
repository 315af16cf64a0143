use thiserror::Error;

/// Common error type for Core SBC components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup error: {0}")]
    Logging(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
