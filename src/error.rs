//! Error types

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can happen during session retrieval/handling.
///
/// Tampered, forged or undecodable session payloads are *not* errors: the store
/// reports them exactly like a missing session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The store is misconfigured (missing or short secret, missing salt, bad key parameters).
    /// A store returning this error shouldn't be serving requests.
    #[error("Invalid session configuration: {0}")]
    Configuration(String),
    /// A session record failed validation on create/update
    #[error("Invalid session record: {0}")]
    Validation(String),
    /// Session record wasn't found in storage
    #[error("Session not found")]
    NotFound,
    /// Error serializing the session data or sealing the payload
    #[error("Failed to serialize session: {0}")]
    Serialization(Box<dyn std::error::Error + Send + Sync>),
    /// A generic error from the storage backend. This error type can be
    /// used when implementing a custom session repository.
    #[error("Storage backend error: {0}")]
    Backend(Box<dyn std::error::Error + Send + Sync>),
    /// Error while setting up or tearing down storage resources
    #[error("Storage setup/teardown error: {0}")]
    SetupTeardown(String),

    #[cfg(any(feature = "sqlx_postgres", feature = "sqlx_sqlite"))]
    #[error("Sqlx error: {0}")]
    SqlxError(#[from] sqlx::Error),
}

/// Error returned by a [`SessionSerializer`](crate::serializer::SessionSerializer)
/// when a stored payload can't be decoded.
#[derive(Debug, thiserror::Error)]
#[error("Failed to decode session payload: {0}")]
pub struct DecodeError(pub Box<dyn std::error::Error + Send + Sync>);

impl DecodeError {
    /// Wrap any error as a decode error
    pub fn new(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(error))
    }
}
