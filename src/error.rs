use thiserror::Error;

/// Main error type for kbgraph
#[derive(Error, Debug)]
pub enum KbError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Topic, version or resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Both path endpoints exist but nothing connects them
    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// A topic has zero or several latest versions, or its ancestry loops
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Parent assignment would close a cycle in the hierarchy
    #[error("Cycle rejected: {0}")]
    Cycle(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl KbError {
    /// True for ordinary absence and for latest-version invariant breaches,
    /// which callers see the same way.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KbError::NotFound(_) | KbError::Integrity(_))
    }
}

/// Convenient Result type using KbError
pub type Result<T> = std::result::Result<T, KbError>;
