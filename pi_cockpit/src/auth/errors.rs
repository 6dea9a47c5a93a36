//! Authentication error types.

use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Token failed signature, expiry or subject checks
    #[error("Invalid token")]
    InvalidToken,

    /// Token signing failed
    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// No usable credentials on a protected request
    #[error("Unauthorized")]
    Unauthorized,

    /// Email/password pair did not match a credential
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// User or access request not found
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Access request was already approved or rejected
    #[error("Request already processed")]
    AlreadyProcessed,

    /// Email already exists as a credential or pending request
    #[error("Email already exists")]
    DuplicateEmail,

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AuthError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database, hashing and signing errors are collapsed into a generic message.
    pub fn client_message(&self) -> String {
        match self {
            AuthError::Database(_) | AuthError::HashingFailed | AuthError::Signing(_) => {
                "Internal server error".to_string()
            }
            AuthError::InvalidToken => "Unauthorized".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
