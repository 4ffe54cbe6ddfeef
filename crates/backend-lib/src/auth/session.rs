// ============================
// crates/backend-lib/src/auth/session.rs
// ============================
//! Login session management on top of the KV store.
//!
//! Layout of the records written for a session (`app` is the configured
//! application name):
//!
//! | key                                   | type   | content                    |
//! |---------------------------------------|--------|----------------------------|
//! | `{app}:session:{id}`                  | string | owner user id              |
//! | `{app}:session:{id}:access_tokens`    | hash   | api id -> access token     |
//! | `{app}:session:{id}:refresh_tokens`   | hash   | api id -> refresh token    |
//! | `{app}:user_sessions:{user}`          | list   | session ids, oldest first  |
//!
//! The per-user list only exists when a session cap is configured. It is a
//! bookkeeping aid for eviction and is never read when validating. Its TTL
//! is pushed forward on every login and renewal so it never expires before
//! the sessions it lists, and ids whose record is gone are pruned before
//! the cap is enforced.
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use sessiongate_common::{ExpireMode, TokenPair};

use super::locks::UserLocks;
use super::token_generator::generate_session_id;
use crate::cipher::CookieCipher;
use crate::config::SessionSettings;
use crate::error::{AppError, StoreError};
use crate::kv::KvStore;
use crate::metrics::{
    SESSION_CREATED, SESSION_DELETED, SESSION_EVICTED, SESSION_INDEX_PRUNED, SESSION_RENEW_FAILED,
};

const SESSION_KIND: &str = "session";
const USER_INDEX_KIND: &str = "user_sessions";
const ACCESS_TOKENS_SUFFIX: &str = "access_tokens";
const REFRESH_TOKENS_SUFFIX: &str = "refresh_tokens";

/// Session manager for cookie-based logins
pub struct SessionManager {
    app_name: String,
    settings: SessionSettings,
    kv: Arc<dyn KvStore>,
    cipher: CookieCipher,
    locks: UserLocks,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("app_name", &self.app_name)
            .field("expire_in", &self.settings.expire_in)
            .field("expire_mode", &self.settings.expire_mode)
            .field("max_cnt_per_user", &self.settings.max_cnt_per_user)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a new session manager. Fails if the encryption key is unusable.
    pub fn new(
        app_name: impl Into<String>,
        settings: SessionSettings,
        kv: Arc<dyn KvStore>,
    ) -> Result<Self, AppError> {
        let cipher = CookieCipher::from_base64_key(&settings.encryption_key)?;
        Ok(Self {
            app_name: app_name.into(),
            settings,
            kv,
            cipher,
            locks: UserLocks::new(),
        })
    }

    pub fn cipher(&self) -> &CookieCipher {
        &self.cipher
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn expire_mode(&self) -> ExpireMode {
        self.settings.expire_mode
    }

    pub fn expire_in(&self) -> Duration {
        self.settings.expire_in()
    }

    /// Number of users that have a lock registered
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Key of the base record of a session
    pub fn session_key(&self, session_id: &str) -> String {
        format!("{}:{SESSION_KIND}:{session_id}", self.app_name)
    }

    /// Key of a user's session index
    pub fn user_index_key(&self, user_id: &str) -> String {
        format!("{}:{USER_INDEX_KIND}:{user_id}", self.app_name)
    }

    fn access_tokens_key(&self, session_id: &str) -> String {
        format!("{}:{ACCESS_TOKENS_SUFFIX}", self.session_key(session_id))
    }

    fn refresh_tokens_key(&self, session_id: &str) -> String {
        format!("{}:{REFRESH_TOKENS_SUFFIX}", self.session_key(session_id))
    }

    /// Run one KV round-trip under the configured deadline
    async fn call<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.settings.store_timeout(), op)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    /// Create a session for an authenticated user and return its id.
    ///
    /// When a per-user cap is configured, the push onto the user's index and
    /// the following trim run under that user's lock.
    pub async fn create_session(
        &self,
        user_id: &str,
        tokens: Option<&HashMap<String, TokenPair>>,
    ) -> Result<String, AppError> {
        let session_id = generate_session_id();
        let ttl = self.expire_in();

        self.call(self.kv.set(&self.session_key(&session_id), user_id, ttl))
            .await?;

        if let Some(tokens) = tokens.filter(|t| !t.is_empty()) {
            self.write_token_containers(&session_id, tokens, ttl).await?;
        }

        if self.settings.max_cnt_per_user > 0 {
            let index_key = self.user_index_key(user_id);
            let _guard = self.locks.lock(&index_key).await;

            self.call(self.kv.push(&index_key, &session_id)).await?;
            if let Err(e) = self.call(self.kv.expire(&index_key, ttl)).await {
                tracing::warn!(key = %index_key, error = %e, "failed to stamp session index TTL");
            }
            self.cap(&index_key).await?;
        }

        counter!(SESSION_CREATED).increment(1);
        tracing::debug!(user_id, "session created");
        Ok(session_id)
    }

    async fn write_token_containers(
        &self,
        session_id: &str,
        tokens: &HashMap<String, TokenPair>,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let access: HashMap<String, String> = tokens
            .iter()
            .map(|(api, pair)| (api.clone(), pair.access_token.clone()))
            .collect();
        let refresh: HashMap<String, String> = tokens
            .iter()
            .map(|(api, pair)| (api.clone(), pair.refresh_token.clone()))
            .collect();

        for (key, fields) in [
            (self.access_tokens_key(session_id), access),
            (self.refresh_tokens_key(session_id), refresh),
        ] {
            self.call(self.kv.set_fields(&key, &fields)).await?;
            self.call(self.kv.expire(&key, ttl)).await?;
        }
        Ok(())
    }

    /// Resolve a session id to its owner. `Ok(None)` means expired or unknown.
    pub async fn validate_session(&self, session_id: &str) -> Result<Option<String>, AppError> {
        Ok(self.call(self.kv.get(&self.session_key(session_id))).await?)
    }

    /// Push the expiry of a sliding session forward, along with the owner's
    /// session index when capping is on.
    ///
    /// Failures are logged and swallowed: a missed renewal only means the
    /// session expires on its previous schedule.
    pub async fn renew_session(&self, session_id: &str, user_id: &str, has_external_tokens: bool) {
        if self.settings.expire_mode != ExpireMode::Sliding {
            return;
        }
        let ttl = self.expire_in();

        let mut keys = vec![self.session_key(session_id)];
        if has_external_tokens {
            keys.push(self.access_tokens_key(session_id));
            keys.push(self.refresh_tokens_key(session_id));
        }
        if self.settings.max_cnt_per_user > 0 {
            keys.push(self.user_index_key(user_id));
        }
        for key in keys {
            if let Err(e) = self.call(self.kv.expire(&key, ttl)).await {
                counter!(SESSION_RENEW_FAILED).increment(1);
                tracing::warn!(key = %key, error = %e, "failed to renew session TTL");
            }
        }
    }

    /// Enforce the per-user session cap on `index_key`.
    ///
    /// Ids whose session record no longer exists are dropped first. Then the
    /// oldest entries beyond the cap are evicted: their records and token
    /// containers are deleted (best-effort, they expire on their own anyway)
    /// and the ids are trimmed from the index. Only failures to read or
    /// update the index are returned. Callers hold the owner's lock.
    pub async fn cap(&self, index_key: &str) -> Result<(), AppError> {
        let max = self.settings.max_cnt_per_user;
        if max == 0 {
            return Ok(());
        }
        self.prune_index(index_key).await?;

        let count = self.call(self.kv.len(index_key)).await?;
        if count <= max {
            return Ok(());
        }

        let diff = count - max;
        let evicted = self
            .call(self.kv.range(index_key, 0, diff as i64 - 1))
            .await?;

        let keys = self.record_keys(&evicted);
        if let Err(e) = self.call(self.kv.delete(&keys)).await {
            tracing::warn!(key = %index_key, error = %e, "failed to delete evicted sessions");
        }

        self.call(self.kv.trim(index_key, diff as i64, -1)).await?;

        counter!(SESSION_EVICTED).increment(evicted.len() as u64);
        tracing::debug!(key = %index_key, evicted = evicted.len(), "session cap enforced");
        Ok(())
    }

    /// Remove ids from the index whose session record has expired or been
    /// deleted
    async fn prune_index(&self, index_key: &str) -> Result<(), AppError> {
        let listed = self.call(self.kv.range(index_key, 0, -1)).await?;

        let mut dead = Vec::new();
        for session_id in listed {
            if !self.call(self.kv.exists(&self.session_key(&session_id))).await? {
                dead.push(session_id);
            }
        }
        if dead.is_empty() {
            return Ok(());
        }

        for session_id in &dead {
            self.call(self.kv.remove(index_key, session_id)).await?;
        }
        // Token containers may outlive the base record by a little
        if let Err(e) = self.call(self.kv.delete(&self.record_keys(&dead))).await {
            tracing::warn!(key = %index_key, error = %e, "failed to delete stale token containers");
        }

        counter!(SESSION_INDEX_PRUNED).increment(dead.len() as u64);
        tracing::debug!(key = %index_key, pruned = dead.len(), "pruned stale session ids");
        Ok(())
    }

    /// Base record and both token containers of every given session
    fn record_keys(&self, session_ids: &[String]) -> Vec<String> {
        session_ids
            .iter()
            .flat_map(|id| {
                [
                    self.session_key(id),
                    self.access_tokens_key(id),
                    self.refresh_tokens_key(id),
                ]
            })
            .collect()
    }

    /// Delete a session and its token containers (logout), and take it off
    /// the owner's index.
    pub async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<bool, AppError> {
        let keys = self.record_keys(&[session_id.to_string()]);
        let removed = self.call(self.kv.delete(&keys)).await?;

        if self.settings.max_cnt_per_user > 0 {
            let index_key = self.user_index_key(user_id);
            let _guard = self.locks.lock(&index_key).await;
            // A leftover id is pruned by the next cap pass
            if let Err(e) = self.call(self.kv.remove(&index_key, session_id)).await {
                tracing::warn!(key = %index_key, error = %e, "failed to remove session from index");
            }
        }

        if removed > 0 {
            counter!(SESSION_DELETED).increment(1);
        }
        Ok(removed > 0)
    }

    /// Attach an external API token pair to a session.
    ///
    /// The containers only get a TTL when they are first created; pairs
    /// added later inherit whatever lifetime is left.
    pub async fn store_external_token_pair(
        &self,
        session_id: &str,
        api_id: &str,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<(), AppError> {
        let access_key = self.access_tokens_key(session_id);
        let refresh_key = self.refresh_tokens_key(session_id);

        let first = !self.call(self.kv.exists(&access_key)).await?;

        self.call(self.kv.set_field(&access_key, api_id, access_token))
            .await?;
        self.call(self.kv.set_field(&refresh_key, api_id, refresh_token))
            .await?;

        if first {
            let ttl = self.expire_in();
            self.call(self.kv.expire(&access_key, ttl)).await?;
            self.call(self.kv.expire(&refresh_key, ttl)).await?;
        }
        Ok(())
    }

    /// Access token stored for `api_id`, or `NotFound`
    pub async fn fetch_external_access_token(
        &self,
        session_id: &str,
        api_id: &str,
    ) -> Result<String, AppError> {
        self.call(self.kv.get_field(&self.access_tokens_key(session_id), api_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("access token for '{api_id}'")))
    }

    /// Refresh token stored for `api_id`, or `NotFound`
    pub async fn fetch_external_refresh_token(
        &self,
        session_id: &str,
        api_id: &str,
    ) -> Result<String, AppError> {
        self.call(self.kv.get_field(&self.refresh_tokens_key(session_id), api_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("refresh token for '{api_id}'")))
    }
}
