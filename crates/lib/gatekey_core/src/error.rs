//! Crate-wide error type.
//!
//! Every fallible public operation returns [`AuthError`]. Backend failures are
//! wrapped as [`AuthError::Server`] so store internals never cross the
//! boundary; token decode failures are all normalized to the same
//! `Unauthorized` error regardless of root cause.

use thiserror::Error;

use crate::store::StoreError;

/// Convenience alias for fallible auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Payload parse error: {0}")]
    PayloadParse(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl AuthError {
    /// HTTP status code this error maps to at the boundary.
    pub fn status(&self) -> u16 {
        match self {
            AuthError::Validation(_) | AuthError::UnsupportedProvider(_) => 422,
            AuthError::Conflict(_) => 409,
            AuthError::Unauthorized(_) => 401,
            AuthError::NotFound(_) => 404,
            AuthError::PayloadParse(_) => 400,
            AuthError::Server(_) => 500,
        }
    }

    /// Machine-readable kind tag carried in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "VALIDATION",
            AuthError::Conflict(_) => "CONFLICT",
            AuthError::Unauthorized(_) => "UNAUTHORIZED",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            AuthError::PayloadParse(_) => "PAYLOAD_PARSE_ERROR",
            AuthError::Server(_) => "SERVER_ERR",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Server(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_kind_mapping() {
        let cases: Vec<(AuthError, u16, &str)> = vec![
            (AuthError::Validation("x".into()), 422, "VALIDATION"),
            (AuthError::Conflict("x".into()), 409, "CONFLICT"),
            (AuthError::Unauthorized("x".into()), 401, "UNAUTHORIZED"),
            (AuthError::NotFound("x".into()), 404, "NOT_FOUND"),
            (
                AuthError::UnsupportedProvider("x".into()),
                422,
                "UNSUPPORTED_PROVIDER",
            ),
            (
                AuthError::PayloadParse("x".into()),
                400,
                "PAYLOAD_PARSE_ERROR",
            ),
            (AuthError::Server("x".into()), 500, "SERVER_ERR"),
        ];
        for (err, status, kind) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn store_errors_become_server_errors() {
        let err: AuthError = StoreError::Backend("connection refused".into()).into();
        assert!(matches!(err, AuthError::Server(_)));
        assert_eq!(err.status(), 500);
    }
}
