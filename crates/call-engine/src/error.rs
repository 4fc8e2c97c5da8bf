use thiserror::Error;

use crate::transport::TransportError;

/// Result type for call engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for call engine operations
#[derive(Debug, Error)]
pub enum Error {
    /// The transport collaborator rejected an operation
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A media processing component failed to initialize or process
    #[error("media error: {0}")]
    Media(#[from] peercall_media_core::Error),

    /// The engine is in the wrong lifecycle state for the operation
    #[error("invalid state: {0}")]
    InvalidState(String),
}
