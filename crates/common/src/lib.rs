// ================
// common/src/lib.rs
// ================
//! Common types shared between the session core, the server binary and
//! HTTP clients of the login endpoints.
//! This module defines the JSON bodies exchanged over HTTP and the small
//! enums that appear in configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a session's lifetime is measured
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpireMode {
    /// Fixed lifetime counted from creation
    Absolute,
    /// Lifetime renewed on each successful validation
    #[default]
    Sliding,
}

impl ExpireMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpireMode::Absolute => "absolute",
            ExpireMode::Sliding => "sliding",
        }
    }
}

/// Access/refresh token pair issued by an external API for a session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Credentials posted to the login endpoint
/// # Fields
/// * `username` - Login name forwarded to the identity backend
/// * `password` - Password forwarded to the identity backend, never stored
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Answer of the upstream identity backend for a successful login
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct IdentityResponse {
    /// Authenticated principal
    #[serde(rename = "uid")]
    pub user_id: String,
    /// External API tokens keyed by API identifier
    #[serde(default)]
    pub tokens: HashMap<String, TokenPair>,
}

/// Body returned for an authenticated session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: String,
    pub expire_mode: ExpireMode,
}

/// Body returned to an API client authenticated by bearer token
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiIdentity {
    pub user_id: String,
    pub client_id: String,
}

/// JSON error envelope: `{"error": {"code": .., "message": ..}}`
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expire_mode_serde() {
        let mode: ExpireMode = serde_json::from_str("\"absolute\"").unwrap();
        assert_eq!(mode, ExpireMode::Absolute);
        assert_eq!(serde_json::to_string(&ExpireMode::Sliding).unwrap(), "\"sliding\"");
        assert!(serde_json::from_str::<ExpireMode>("\"forever\"").is_err());
    }

    #[test]
    fn test_identity_response_without_tokens() {
        let resp: IdentityResponse = serde_json::from_str(r#"{"uid":"42"}"#).unwrap();
        assert_eq!(resp.user_id, "42");
        assert!(resp.tokens.is_empty());
    }

    #[test]
    fn test_error_response_shape() {
        let body = serde_json::to_value(ErrorResponse::new("RATE_001", "slow down")).unwrap();
        assert_eq!(body["error"]["code"], "RATE_001");
        assert_eq!(body["error"]["message"], "slow down");
    }
}
