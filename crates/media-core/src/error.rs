use thiserror::Error;

/// Result type for media processing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for media processing operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Frame layout (length, channels, rate) is not what the stage expects
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A configuration value is out of range
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A processing stage failed on otherwise valid input
    #[error("processing failed: {0}")]
    ProcessingFailed(String),
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::ProcessingFailed(err.to_string())
    }
}
