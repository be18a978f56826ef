use thiserror::Error;

/// Typed failure returned by an embedding provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Provider quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Fatal provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// Whether the failure should switch the batch to local pseudo-embeddings
    #[must_use]
    pub const fn triggers_fallback(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::QuotaExceeded(_))
    }

    /// Whether the call may succeed if retried
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Error, Debug)]
pub enum VecMigrateError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Migration already in progress")]
    AlreadyRunning,

    #[error("Invalid migration state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Corrupted progress record: {0}")]
    CorruptProgress(String),

    #[error("{0}")]
    Custom(String),
}

impl VecMigrateError {
    /// Errors that abort a whole migration run rather than a table or a record
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::Provider(e) => matches!(e, ProviderError::Fatal(_)),
            Self::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Configuration(_)
            ),
            Self::ConfigError(_) | Self::CorruptProgress(_) | Self::Redis(_) => true,
            _ => false,
        }
    }
}

impl From<redis::RedisError> for VecMigrateError {
    fn from(e: redis::RedisError) -> Self {
        Self::Redis(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VecMigrateError>;
