// crates/backend-lib/src/error.rs

//! Central error types + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sessiongate_common::ErrorResponse;
use thiserror::Error;

/// Failures of the key-value backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("KV backend error: {0}")]
    Backend(String),

    #[error("KV operation timed out")]
    Timeout,

    #[error("Key {key} holds a value of the wrong type")]
    WrongType { key: String },
}

/// Failures of the cookie cipher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed")]
    Decrypt,
}

/// Malformed configuration detected at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Identity backend error: {0}")]
    Identity(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Crypto(_) | AppError::Unauthorized(_) | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            },
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Identity(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NF_001",
            AppError::Store(StoreError::Timeout) => "KV_002",
            AppError::Store(_) => "KV_001",
            AppError::Crypto(_) => "AUTH_004",
            AppError::Config(_) => "CFG_001",
            AppError::Unauthorized(_) => "AUTH_001",
            AppError::InvalidCredentials => "AUTH_002",
            AppError::RateLimited(_) => "RATE_001",
            AppError::Identity(_) => "IDP_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::NotFound(_) => "Resource not found".to_string(),
            AppError::Crypto(_) => "Invalid session".to_string(),
            AppError::Unauthorized(_) | AppError::InvalidCredentials => {
                "Authentication failed".to_string()
            },
            AppError::RateLimited(_) => "Rate limit exceeded, please try again later".to_string(),
            AppError::Identity(_) => "Identity service unavailable".to_string(),
            AppError::Store(_) | AppError::Config(_) | AppError::Internal(_) => {
                "An internal server error occurred".to_string()
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = self.error_code(), "{self}");
        }

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = ErrorResponse::new(self.error_code(), message);
        (status, axum::Json(body)).into_response()
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("access token for github".to_string());
        assert_eq!(err.to_string(), "Not found: access token for github");

        let err: AppError = StoreError::Timeout.into();
        assert_eq!(err.to_string(), "KV operation timed out");

        let err = AppError::RateLimited("ip 10.0.0.1".to_string());
        assert_eq!(err.to_string(), "Rate limit exceeded: ip 10.0.0.1");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Store(StoreError::Backend("conn reset".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Crypto(CryptoError::Decrypt).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::RateLimited("x".to_string()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Identity("down".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_app_error_error_codes() {
        assert_eq!(AppError::Store(StoreError::Timeout).error_code(), "KV_002");
        assert_eq!(
            AppError::Store(StoreError::WrongType { key: "k".to_string() }).error_code(),
            "KV_001"
        );
        assert_eq!(AppError::InvalidCredentials.error_code(), "AUTH_002");
        assert_eq!(
            AppError::Config(ConfigError::Invalid("x".to_string())).error_code(),
            "CFG_001"
        );
    }

    #[test]
    fn test_error_from_impls() {
        let app_err: AppError = CryptoError::Decrypt.into();
        assert!(matches!(app_err, AppError::Crypto(CryptoError::Decrypt)));

        let app_err: AppError = "boom".into();
        assert!(matches!(app_err, AppError::Internal(_)));
    }

    #[tokio::test]
    async fn test_error_into_response_is_json() {
        let response = AppError::RateLimited("session".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("application/json"));
    }
}
