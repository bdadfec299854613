//! Error types for the trainer API client.
//!
//! # Design
//! A 401 gets its own variant because the client has already invalidated the
//! local session by the time it is returned. Other non-2xx responses land in
//! `Http` with the server's `error` message or a status-based fallback.
//!
//! Signup, login and logout surface a fixed message regardless of what went
//! wrong underneath. The underlying error stays reachable through
//! `std::error::Error::source` for logging and debugging.

use thiserror::Error;

use crate::session::StoreError;
use crate::transport::TransportError;

/// Errors returned by `ApiClient` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// An authenticated operation was called without a token. No request was sent.
    #[error("Authentication token is required")]
    AuthRequired,

    /// The server returned 401. Stored tokens have been cleared.
    #[error("authentication failed: {message}")]
    AuthExpired { message: String },

    /// The server returned a non-2xx status other than 401.
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Sign up failed")]
    SignupFailed(#[source] Box<ApiError>),

    #[error("Login failed")]
    LoginFailed(#[source] Box<ApiError>),

    #[error("Logout failed")]
    LogoutFailed(#[source] Box<ApiError>),

    /// The request never produced a response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// HTTP status carried by this error, looking through masking wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::AuthExpired { .. } => Some(401),
            ApiError::Http { status, .. } => Some(*status),
            ApiError::SignupFailed(inner)
            | ApiError::LoginFailed(inner)
            | ApiError::LogoutFailed(inner) => inner.status(),
            _ => None,
        }
    }
}
