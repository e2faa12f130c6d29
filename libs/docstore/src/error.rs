use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Errors surfaced by the persistence bootstrap.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Missing or invalid connection information or settings. Never recovered.
    #[error("Invalid persistence configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PersistenceError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        PersistenceError::Configuration(msg.into())
    }
}

/// Errors raised by a document store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The server could not be reached (DNS, refused connection, timeout, TLS).
    #[error("Document store at '{url}' is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("Document store at '{url}' answered HTTP {status}")]
    Status { url: String, status: u16 },

    /// The call is not valid in the store's current state.
    #[error("Invalid store operation: {0}")]
    InvalidOperation(String),

    /// The server answered with a body that could not be decoded.
    #[error("Failed to decode response from '{url}': {reason}")]
    Decode { url: String, reason: String },
}

impl StoreError {
    /// Whether this error came from the network or the remote server rather
    /// than from misuse of the client.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, StoreError::Unreachable { .. } | StoreError::Status { .. })
    }
}
