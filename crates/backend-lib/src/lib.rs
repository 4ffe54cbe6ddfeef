// ============================
// sessiongate-core/src/lib.rs
// ============================
//! Session and throttling core for cookie-authenticated HTTP services.
//!
//! * [`auth::SessionManager`] issues, validates, renews, caps and evicts
//!   login sessions stored behind the [`kv::KvStore`] port.
//! * [`cipher::CookieCipher`] seals session ids for transport in cookies.
//! * [`throttle::BucketStore`] admits or denies requests per client or
//!   session with token buckets.
//! * [`auth::AccessTokens`] resolves bearer tokens of API clients.
//! * [`middleware`] and [`router`] wire those into axum.

pub mod auth;
pub mod cipher;
pub mod config;
pub mod cookies;
pub mod error;
pub mod kv;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod sweeper;
pub mod throttle;

use std::sync::Arc;

use crate::auth::{AccessTokens, IdentityBackend, SessionManager};
use crate::config::Settings;
use crate::error::AppError;
use crate::kv::KvStore;
use crate::throttle::BucketStore;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Session manager
    pub sessions: Arc<SessionManager>,
    /// Bearer access tokens
    pub access_tokens: Arc<AccessTokens>,
    /// Token buckets
    pub throttle: Arc<BucketStore>,
    /// Upstream credential check
    pub identity: Arc<dyn IdentityBackend>,
    /// Settings
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Validate the settings and build every shared component
    pub fn new(
        settings: Settings,
        kv: Arc<dyn KvStore>,
        identity: Arc<dyn IdentityBackend>,
    ) -> Result<Self, AppError> {
        settings.validate()?;

        let access_tokens = Arc::new(AccessTokens::new(
            settings.app_name.clone(),
            Arc::clone(&kv),
            settings.session.store_timeout(),
        ));
        let sessions = Arc::new(SessionManager::new(
            settings.app_name.clone(),
            settings.session.clone(),
            kv,
        )?);
        let throttle = Arc::new(BucketStore::from_settings(&settings.throttle)?);

        Ok(Self {
            sessions,
            access_tokens,
            throttle,
            identity,
            settings: Arc::new(settings),
        })
    }
}
