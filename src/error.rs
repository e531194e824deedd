use thiserror::Error;

/// Main error type for the registry core
#[derive(Error, Debug)]
pub enum RegistryError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Lookup errors
    #[error("Not found: {0}")]
    NotFound(String),

    // State machine errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Registration errors
    #[error("Conflict detected: {0}")]
    ConflictDetected(String),

    #[error("Governance denied: {0}")]
    GovernanceDenied(String),

    // Retryable persistence failures inside async workers
    #[error("Transient store error: {0}")]
    TransientStore(String),

    // Queue errors
    #[error("Queue error: {0}")]
    Queue(String),

    // Symbol grammar errors
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for RegistryError
pub type Result<T> = std::result::Result<T, RegistryError>;

impl RegistryError {
    /// Errors the async merge worker may retry before marking the record failed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::TransientStore(_) | RegistryError::Database(_)
        )
    }
}
