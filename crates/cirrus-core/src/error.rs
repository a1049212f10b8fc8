use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

/// Closed error taxonomy for the security core. Messages are what the caller
/// may show to a user; throttling and credential failures stay generic so a
/// response never reveals which check rejected the request.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Too many failed attempts. Try again in 30 minutes.")]
    Throttled,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account not verified. Please check your email for verification instructions.")]
    Unverified,

    #[error("Not authorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    /// Blob-store failure. The source never reaches a response body.
    #[error("Storage operation failed")]
    Storage(#[source] anyhow::Error),

    #[error("{0}")]
    Validation(String),

    /// Persistence-layer failure. Fatal for the request; never retried here.
    #[error("Internal error")]
    Persistence(#[from] anyhow::Error),
}

impl CoreError {
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Throttled => "THROTTLED",
            CoreError::InvalidCredentials => "INVALID_CREDENTIALS",
            CoreError::Unverified => "UNVERIFIED",
            CoreError::Unauthorized => "UNAUTHORIZED",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::Storage(_) => "STORAGE_FAILURE",
            CoreError::Validation(_) => "VALIDATION_FAILURE",
            CoreError::Persistence(_) => "INTERNAL",
        }
    }

    /// Fatal errors must not be retried by the caller; everything else is
    /// recoverable with corrected input or by waiting out a block.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::Storage(_) | CoreError::Persistence(_))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }
}
