//! Error types for wxtoot

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WxTootError>;

#[derive(Error, Debug)]
pub enum WxTootError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Every attempt of a post cycle failed; the host decides what to do with the record.
    #[error("Max retries ({tries}) exceeded: {last}")]
    MaxRetriesExceeded { tries: u32, last: PlatformError },
}

impl WxTootError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            WxTootError::InvalidInput(_) => 3,
            WxTootError::Config(_) => 2,
            WxTootError::Platform(PlatformError::Authentication(_)) => 2,
            WxTootError::MaxRetriesExceeded {
                last: PlatformError::Authentication(_),
                ..
            } => 2,
            WxTootError::Platform(_) => 1,
            WxTootError::MaxRetriesExceeded { .. } => 1,
            WxTootError::Image(_) => 1,
        }
    }

    /// The platform error carried by this error, if any
    pub fn platform_error(&self) -> Option<&PlatformError> {
        match self {
            WxTootError::Platform(e) => Some(e),
            WxTootError::MaxRetriesExceeded { last, .. } => Some(last),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Error accessing image directory {0}")]
    ImageDirectory(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Media upload failed: {0}")]
    Media(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),
}

impl PlatformError {
    /// Errors that another attempt cannot fix (bad credentials, rejected content)
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PlatformError::Authentication(_) | PlatformError::Validation(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image server returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Image IO error: {0}")]
    Io(#[from] std::io::Error),
}
