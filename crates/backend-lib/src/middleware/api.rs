// crates/backend-lib/src/middleware/api.rs

//! Guards for machine clients: a `Client-Id` gate and bearer access tokens.
use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use metrics::counter;

use crate::auth::access_token::{bearer_token, AccessTokens};
use crate::error::AppError;
use crate::metrics::ACCESS_TOKEN_REJECTED;

/// Header naming the calling client app
pub const CLIENT_ID_HEADER: &str = "client-id";

/// Owner of the bearer token, available as `Extension<AccessTokenContext>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessTokenContext {
    pub user_id: String,
}

/// Client app that passed the gate, available as `Extension<ClientId>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientId(pub String);

/// Registered client apps, optionally narrowed to an allow-list per route
#[derive(Clone, Debug)]
pub struct ClientGate {
    registered: Arc<HashSet<String>>,
    allowed: Option<Arc<HashSet<String>>>,
}

impl ClientGate {
    pub fn new<I, S>(registered: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            registered: Arc::new(registered.into_iter().map(Into::into).collect()),
            allowed: None,
        }
    }

    /// Only admit these clients on the guarded routes
    pub fn allow_only<I, S>(mut self, client_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(Arc::new(client_ids.into_iter().map(Into::into).collect()));
        self
    }

    fn check(&self, client_id: &str) -> Result<(), AppError> {
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(client_id) {
                return Err(AppError::Unauthorized("client id blocked".to_string()));
            }
        }
        if !self.registered.contains(client_id) {
            return Err(AppError::Unauthorized(format!("invalid client app: {client_id}")));
        }
        Ok(())
    }
}

/// Require a known `Client-Id` header
pub async fn require_client_id(
    State(gate): State<ClientGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client_id = request
        .headers()
        .get(CLIENT_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized("client app id required".to_string()))?;

    gate.check(&client_id)?;

    request.extensions_mut().insert(ClientId(client_id));
    Ok(next.run(request).await)
}

/// Require a live bearer access token.
///
/// * no token: 401
/// * unknown or expired token: 401
/// * KV failure: 500
pub async fn require_access_token(
    State(tokens): State<Arc<AccessTokens>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
        .ok_or_else(|| AppError::Unauthorized("access token missing".to_string()))?;

    let Some(user_id) = tokens.resolve(&token).await? else {
        counter!(ACCESS_TOKEN_REJECTED).increment(1);
        return Err(AppError::Unauthorized("expired or invalid access token".to_string()));
    };

    request.extensions_mut().insert(AccessTokenContext { user_id });
    Ok(next.run(request).await)
}
