use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation error: {0}")]
    ValidatorError(#[from] validator::ValidationErrors),

    #[error("Reply depth {depth} exceeds the maximum of {max_depth}")]
    DepthExceeded { depth: usize, max_depth: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Another operation is already in flight for comment {0}")]
    Busy(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error categories the presentation layer can switch on
/// without matching message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Auth,
    DepthExceeded,
    NotFound,
    Busy,
    Backend,
    Timeout,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Authentication(_) | AppError::Authorization(_) => ErrorKind::Auth,
            AppError::Validation(_) | AppError::ValidatorError(_) => ErrorKind::Validation,
            AppError::DepthExceeded { .. } => ErrorKind::DepthExceeded,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Database(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            AppError::Busy(_) => ErrorKind::Busy,
            AppError::Timeout(_) => ErrorKind::Timeout,
            AppError::Request(err) if err.is_timeout() => ErrorKind::Timeout,
            AppError::Conflict(_)
            | AppError::Backend(_)
            | AppError::Database(_)
            | AppError::Request(_)
            | AppError::Serialization(_)
            | AppError::Config(_) => ErrorKind::Backend,
        }
    }

    /// Whether the caller may reasonably retry the same request later.
    /// The core never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Backend | ErrorKind::Timeout | ErrorKind::Busy
        ) && !matches!(self, AppError::Config(_))
    }
}

// 便利函数，用于创建常见错误
impl AppError {
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{} not found", resource))
    }

    pub fn unauthorized(msg: &str) -> Self {
        Self::Authentication(msg.to_string())
    }

    pub fn forbidden(msg: &str) -> Self {
        Self::Authorization(msg.to_string())
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }

    pub fn conflict(msg: &str) -> Self {
        Self::Conflict(msg.to_string())
    }

    pub fn backend(msg: &str) -> Self {
        Self::Backend(msg.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinguishable() {
        assert_eq!(AppError::unauthorized("x").kind(), ErrorKind::Auth);
        assert_eq!(AppError::forbidden("x").kind(), ErrorKind::Auth);
        assert_eq!(AppError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(AppError::not_found("Comment").kind(), ErrorKind::NotFound);
        assert_eq!(AppError::Busy("c1".into()).kind(), ErrorKind::Busy);
        assert_eq!(
            AppError::DepthExceeded { depth: 9, max_depth: 8 }.kind(),
            ErrorKind::DepthExceeded
        );
        assert_eq!(
            AppError::Timeout(Duration::from_secs(10)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(AppError::conflict("dup").kind(), ErrorKind::Backend);
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_retryable() {
        assert!(AppError::backend("503").is_retryable());
        assert!(AppError::Timeout(Duration::from_millis(5)).is_retryable());
        assert!(!AppError::forbidden("nope").is_retryable());
        assert!(!AppError::validation("empty").is_retryable());
        assert!(!AppError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(
            AppError::not_found("Comment").to_string(),
            "Not found: Comment not found"
        );
    }
}
