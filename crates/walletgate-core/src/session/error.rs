use thiserror::Error;

use crate::api::ApiError;

/// Errors surfaced to UI callers. Display strings are user-presentable.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account or organization not found")]
    NotFound,

    #[error("The server encountered an error. Please try again later.")]
    ServerError,

    #[error("Your session has expired. Please log in again.")]
    SessionExpired,

    #[error("Unable to connect to server. Check your internet connection.")]
    Connection(String),

    #[error("You do not have access to this resource")]
    AccessDenied,

    #[error("{0}")]
    Rejected(String),

    #[error("Unexpected response from server")]
    InvalidResponse(String),

    #[error("Not signed in")]
    NoToken,

    #[error("The session ended before the request completed")]
    SessionEnded,

    #[error("Could not determine which organization to load")]
    TenantUnknown,

    #[error("Incorrect PIN")]
    IncorrectPin,

    #[error("PIN must be 4 to 6 digits")]
    InvalidPin,

    #[error("PIN login is not available. Please sign in with your password.")]
    PinUnavailable,

    #[error("Sign in with your password before setting up a PIN")]
    NoPendingCredentials,

    #[error("Invalid wallet balance: {0}")]
    InvalidBalance(f64),

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),
}

impl SessionError {
    /// Classify a gateway failure during login, where 401/403 mean bad credentials.
    pub fn from_login_error(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized | ApiError::AccessDenied(_) => SessionError::InvalidCredentials,
            other => other.into(),
        }
    }

    /// Rewrite a status-bearing message into one of the user-facing classes.
    fn from_message(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("401") || lower.contains("unauthorized") {
            SessionError::SessionExpired
        } else if lower.contains("404") || lower.contains("not found") {
            SessionError::NotFound
        } else if ["500", "502", "503", "504"].iter().any(|code| lower.contains(code)) {
            SessionError::ServerError
        } else if lower.contains("network") || lower.contains("connect") || lower.contains("timeout") {
            SessionError::Connection(message)
        } else {
            SessionError::InvalidResponse(message)
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, SessionError::SessionExpired)
    }
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => SessionError::SessionExpired,
            ApiError::AccessDenied(_) => SessionError::AccessDenied,
            ApiError::NotFound(_) => SessionError::NotFound,
            ApiError::RateLimited | ApiError::ServerError(_) => SessionError::ServerError,
            ApiError::Network(message) => SessionError::Connection(message),
            ApiError::InvalidResponse(message) => SessionError::from_message(message),
        }
    }
}
