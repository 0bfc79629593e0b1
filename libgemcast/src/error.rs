//! Error types for Gemcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GemcastError>;

#[derive(Error, Debug)]
pub enum GemcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl GemcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            GemcastError::InvalidInput(_) => 3,
            GemcastError::Lookup(_) => 3,
            GemcastError::Platform(PlatformError::Authentication(_)) => 2,
            GemcastError::Generation(GenerationError::RateLimitExceeded(_)) => 2,
            GemcastError::Platform(_) => 1,
            GemcastError::Generation(_) => 1,
            GemcastError::Config(_) => 1,
            GemcastError::Database(_) => 1,
        }
    }

    /// True when the caption stage was aborted by a provider quota
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            GemcastError::Generation(GenerationError::RateLimitExceeded(_))
        )
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
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt column {column}: {reason}")]
    Corrupt { column: String, reason: String },
}

/// Failure reported by a single text or image backend invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    /// HTTP status code, when the failure came from a remote response
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    /// A caption backend reported an exhausted quota; the stage was abandoned
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("All caption backends failed (last error from {backend}: {source})")]
    AllBackendsFailed {
        backend: String,
        #[source]
        source: BackendError,
    },

    #[error("No caption backends configured")]
    NoBackends,

    #[error("Image prompt generation failed: {0}")]
    ImagePrompt(BackendError),

    #[error("Image generation failed: {0}")]
    Image(BackendError),

    #[error("Gem enhancement failed: {0}")]
    Enhance(BackendError),

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),
}
