//! Request and authentication error types.

use thiserror::Error;

/// Outcome of a failed pipeline request.
///
/// Cloneable so that one refresh failure can be handed to every caller
/// queued behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401 that was not recovered by a refresh
    #[error("Unauthorized")]
    Unauthorized,

    /// Refresh failed or no refresh token was available; the session is gone
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// 403
    #[error("Forbidden, insufficient permissions")]
    Forbidden,

    /// 404
    #[error("Resource not found")]
    NotFound,

    /// 500
    #[error("Internal server error (HTTP {status})")]
    Server { status: u16 },

    /// Any other non-success status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Envelope code other than 200/201
    #[error("{message} (code {code})")]
    Business { code: i64, message: String },

    /// Connection failure, no response received
    #[error("Network error: {0}")]
    Network(String),

    /// No response within the request timeout
    #[error("Request timed out")]
    Timeout,

    /// Response body did not have the expected shape
    #[error("Invalid response: {0}")]
    Decode(String),

    /// The refresh this request was waiting on was abandoned
    #[error("Request cancelled")]
    Cancelled,
}

impl ApiError {
    /// Returns true if repeating the request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout | ApiError::Server { .. } => true,
            ApiError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Forbidden => Some(403),
            ApiError::NotFound => Some(404),
            ApiError::Server { status } | ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Invalid username or password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The account requires a one-time code
    #[error("One-time code required")]
    OtpRequired,

    /// Session not found
    #[error("Not logged in")]
    NotLoggedIn,

    /// Tokens or identity could not be written to storage
    #[error("Session could not be persisted: {0}")]
    SessionNotPersisted(String),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Request pipeline error
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Api(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<console_config_and_utils::CoreError> for AuthError {
    fn from(e: console_config_and_utils::CoreError) -> Self {
        AuthError::Config(e.to_string())
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transient_network() {
        assert!(ApiError::Network("connection refused".to_string()).is_transient());
        assert!(ApiError::Timeout.is_transient());
    }

    #[test]
    fn test_is_transient_server_errors() {
        assert!(ApiError::Server { status: 500 }.is_transient());
        assert!(ApiError::Http {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(!ApiError::Http {
            status: 409,
            message: "conflict".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_is_not_transient_auth_failures() {
        assert!(!ApiError::Unauthorized.is_transient());
        assert!(!ApiError::Forbidden.is_transient());
        assert!(!ApiError::SessionExpired("refresh rejected".to_string()).is_transient());
        assert!(!ApiError::Cancelled.is_transient());
    }

    #[test]
    fn test_status() {
        assert_eq!(ApiError::Forbidden.status(), Some(403));
        assert_eq!(ApiError::Server { status: 500 }.status(), Some(500));
        assert_eq!(ApiError::Timeout.status(), None);
    }

    #[test]
    fn test_business_error_display() {
        let err = ApiError::Business {
            code: 40001,
            message: "Username already exists".to_string(),
        };
        assert_eq!(err.to_string(), "Username already exists (code 40001)");
    }

    #[test]
    fn test_auth_error_wraps_api_error() {
        let err: AuthError = ApiError::Timeout.into();
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Request timed out");
        assert!(!AuthError::OtpRequired.is_transient());
        assert!(!AuthError::InvalidCredentials("bad password".to_string()).is_transient());
    }
}
