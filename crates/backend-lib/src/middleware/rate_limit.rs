// crates/backend-lib/src/middleware/rate_limit.rs

//! Throttling middleware backed by the shared [`BucketStore`].
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use super::session::SessionContext;
use crate::error::{AppError, ConfigError};
use crate::throttle::BucketStore;

/// Bucket group a throttling middleware instance draws from
#[derive(Clone, Debug)]
pub struct ThrottleGroup {
    store: Arc<BucketStore>,
    group_id: Arc<str>,
    trust_proxy_headers: bool,
}

impl ThrottleGroup {
    /// Bind a middleware to `group_id`; the group must be configured
    pub fn new(store: Arc<BucketStore>, group_id: &str) -> Result<Self, ConfigError> {
        if !store.has_group(group_id) {
            return Err(ConfigError::Invalid(format!(
                "throttle group '{group_id}' is not configured"
            )));
        }
        Ok(Self {
            store,
            group_id: Arc::from(group_id),
            trust_proxy_headers: false,
        })
    }

    /// Key clients by `x-real-ip` / `x-forwarded-for` instead of the peer
    /// address. Off by default since clients can set those headers freely.
    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    fn allow(&self, identity: &str) -> bool {
        self.store.allow(&self.group_id, identity, Instant::now())
    }
}

/// Throttle by client IP, before the caller is known
pub async fn throttle_ip(
    State(group): State<ThrottleGroup>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(&request, group.trust_proxy_headers);
    if !group.allow(&ip) {
        return Err(AppError::RateLimited(format!("ip {ip}")));
    }
    Ok(next.run(request).await)
}

/// Throttle by session id; must run inside `require_session`
pub async fn throttle_session(
    State(group): State<ThrottleGroup>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(session) = request.extensions().get::<SessionContext>() else {
        return Err(AppError::Unauthorized("invalid session ID".to_string()));
    };
    if !group.allow(&session.session_id) {
        return Err(AppError::RateLimited("session".to_string()));
    }
    Ok(next.run(request).await)
}

/// Client address: proxy headers first when trusted, then the socket
fn client_ip(request: &Request, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(request) {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string())
}

fn forwarded_ip(request: &Request) -> Option<String> {
    let headers = request.headers();
    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return Some(ip.to_string());
    }
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}
