// ============================
// crates/backend-lib/src/auth/identity.rs
// ============================
//! Upstream identity backend.
//!
//! Credentials are never checked here. The login route forwards them to an
//! identity service over HTTP and only consumes its verdict: the user id
//! and any external API tokens to keep with the session.
use async_trait::async_trait;
use reqwest::StatusCode;
use sessiongate_common::{IdentityResponse, LoginRequest};

use crate::config::IdentitySettings;
use crate::error::AppError;

#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Verify credentials, returning the authenticated identity
    async fn authenticate(&self, request: &LoginRequest) -> Result<IdentityResponse, AppError>;
}

/// Identity backend reached with a JSON POST
#[derive(Debug, Clone)]
pub struct HttpIdentityBackend {
    client: reqwest::Client,
    login_url: String,
}

impl HttpIdentityBackend {
    pub fn new(settings: &IdentitySettings) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| AppError::Identity(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            login_url: settings.login_url.clone(),
        })
    }
}

#[async_trait]
impl IdentityBackend for HttpIdentityBackend {
    async fn authenticate(&self, request: &LoginRequest) -> Result<IdentityResponse, AppError> {
        let response = self
            .client
            .post(&self.login_url)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::Identity(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let identity: IdentityResponse = response
                    .json()
                    .await
                    .map_err(|e| AppError::Identity(format!("malformed identity response: {e}")))?;
                if identity.user_id.is_empty() {
                    return Err(AppError::Identity("identity response without uid".to_string()));
                }
                Ok(identity)
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::InvalidCredentials),
            status => Err(AppError::Identity(format!("unexpected status {status}"))),
        }
    }
}
