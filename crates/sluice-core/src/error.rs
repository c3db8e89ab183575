use thiserror::Error;

/// Errors raised outside the streaming hot path.
///
/// The pipeline itself never fails on stream content; these cover loading
/// configuration and the I/O done by tools built on top of the pipeline.
#[derive(Debug, Error)]
pub enum SluiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SluiceError {
    /// Short, stable error code for logs and tool output.
    pub fn code(&self) -> &'static str {
        match self {
            SluiceError::Config(_) => "CONFIG_ERROR",
            SluiceError::Serialization(_) => "SERIALIZATION_ERROR",
            SluiceError::Io(_) => "IO_ERROR",
            SluiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, SluiceError>;
