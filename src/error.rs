use thiserror::Error;

#[derive(Debug, Error)]
pub enum StudioError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Request error: {0}")]
    RequestError(String),
    #[error("Response error: {0}")]
    ResponseError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Image error: {0}")]
    ImageError(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl StudioError {
    /// Validation failures are the caller's fault; everything else is ours
    /// or an upstream's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, StudioError::ValidationError(_))
    }

    /// The bare message without the category prefix, as shown to end users.
    pub fn message(&self) -> &str {
        match self {
            StudioError::ConfigError(msg)
            | StudioError::ValidationError(msg)
            | StudioError::RequestError(msg)
            | StudioError::ResponseError(msg)
            | StudioError::SerializationError(msg)
            | StudioError::ProviderError(msg)
            | StudioError::StorageError(msg)
            | StudioError::ImageError(msg)
            | StudioError::InternalError(msg) => msg,
        }
    }
}

impl From<reqwest::Error> for StudioError {
    fn from(e: reqwest::Error) -> Self {
        StudioError::RequestError(e.to_string())
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(e: serde_json::Error) -> Self {
        StudioError::SerializationError(e.to_string())
    }
}

impl From<image::ImageError> for StudioError {
    fn from(e: image::ImageError) -> Self {
        StudioError::ImageError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;
