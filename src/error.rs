use thiserror::Error;

pub type Result<T> = core::result::Result<T, AlbumRelayError>;

#[derive(Error, Debug)]
pub enum AlbumRelayError {
    #[error("Album id must not be empty")]
    EmptyAlbumId,

    #[error("Album buffer has been shut down")]
    BufferShutDown,

    #[error("Album buffer must be initialized inside a tokio runtime")]
    NoRuntime,

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Logging setup error: {0}")]
    LoggingSetup(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for AlbumRelayError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        AlbumRelayError::Other(anyhow::anyhow!(err.to_string()))
    }
}
