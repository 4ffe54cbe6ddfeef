// ============================
// crates/backend-lib/src/auth/access_token.rs
// ============================
//! Opaque bearer access tokens for API clients.
//!
//! Only the SHA-256 of a token is stored: `{app}_access:{hex digest}` holds
//! the owner's user id and expires with the token.
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::{AppError, StoreError};
use crate::kv::KvStore;

/// Lowercase hex SHA-256 of a token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Lookup and issuance of access tokens in the KV store
pub struct AccessTokens {
    app_name: String,
    kv: Arc<dyn KvStore>,
    timeout: Duration,
}

impl std::fmt::Debug for AccessTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessTokens")
            .field("app_name", &self.app_name)
            .finish_non_exhaustive()
    }
}

impl AccessTokens {
    pub fn new(app_name: impl Into<String>, kv: Arc<dyn KvStore>, timeout: Duration) -> Self {
        Self {
            app_name: app_name.into(),
            kv,
            timeout,
        }
    }

    /// Key holding the owner of `token`
    pub fn key(&self, token: &str) -> String {
        format!("{}_access:{}", self.app_name, hash_token(token))
    }

    /// Owner of a token; `Ok(None)` if it is unknown or expired
    pub async fn resolve(&self, token: &str) -> Result<Option<String>, AppError> {
        let owner = tokio::time::timeout(self.timeout, self.kv.get(&self.key(token)))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(owner)
    }

    /// Register `token` for `user_id` for `ttl`
    pub async fn issue(&self, token: &str, user_id: &str, ttl: Duration) -> Result<(), AppError> {
        tokio::time::timeout(self.timeout, self.kv.set(&self.key(token), user_id, ttl))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }

    pub async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let removed = tokio::time::timeout(self.timeout, self.kv.delete(&[self.key(token)]))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    #[test]
    fn test_hash_token() {
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer tok123"), Some("tok123"));
        assert_eq!(bearer_token("bearer  tok123 "), Some("tok123"));
        assert_eq!(bearer_token("Basic dXNlcjpwdw=="), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("tok123"), None);
        assert_eq!(bearer_token(""), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_issue_resolve_revoke() {
        let kv = Arc::new(MemoryKv::new());
        let tokens = AccessTokens::new("app", kv.clone(), Duration::from_secs(1));

        tokens.issue("tok", "u1", Duration::from_secs(60)).await.unwrap();
        // Stored under the digest, never the raw token
        assert!(kv.exists(&format!("app_access:{}", hash_token("tok"))).await.unwrap());
        assert_eq!(tokens.resolve("tok").await.unwrap().as_deref(), Some("u1"));
        assert_eq!(tokens.resolve("other").await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(tokens.resolve("tok").await.unwrap(), None);

        tokens.issue("tok", "u1", Duration::from_secs(60)).await.unwrap();
        assert!(tokens.revoke("tok").await.unwrap());
        assert_eq!(tokens.resolve("tok").await.unwrap(), None);
    }
}
