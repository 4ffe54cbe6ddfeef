// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Settings are layered with figment: built-in defaults, then an optional
//! TOML file, then `SESSIONGATE_*` environment variables (`__` separates
//! nested keys, e.g. `SESSIONGATE_SESSION__EXPIRE_IN=600`). The result is a
//! single immutable structure that is validated once before use.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use sessiongate_common::ExpireMode;

use crate::error::ConfigError;

/// Default config file looked up by [`Settings::load`]
pub const DEFAULT_CONFIG_FILE: &str = "sessiongate.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SESSIONGATE_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Prefix of every KV key written by this application
    pub app_name: String,
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Cookie session settings
    pub session: SessionSettings,
    /// Token bucket settings
    pub throttle: ThrottleSettings,
    /// Upstream identity backend
    pub identity: IdentitySettings,
    /// In-process key-value store
    pub kv: KvSettings,
    /// Bearer-token API clients
    pub api: ApiSettings,
}

/// Cookie session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Standard base64 of a 32-byte AES-256-GCM key
    pub encryption_key: String,
    /// Session lifetime (or sliding window) in seconds
    pub expire_in: u64,
    pub expire_mode: ExpireMode,
    /// Where unauthenticated browsers are sent
    pub login_path: String,
    /// Maximum live sessions per user, 0 disables capping
    pub max_cnt_per_user: u64,
    /// Deadline for every KV round-trip, in milliseconds
    pub store_timeout_ms: u64,
}

/// Token bucket settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleSettings {
    /// How often idle buckets are swept
    pub cleanup_cycle_secs: u64,
    /// Buckets idle longer than this are removed by the sweep
    pub cleanup_older_than_secs: u64,
    /// Per-group bucket shape keyed by group id
    pub groups: HashMap<String, BucketGroupSettings>,
    /// Take the client IP from `x-real-ip` / `x-forwarded-for`. Only enable
    /// behind a reverse proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
}

/// Shape of every bucket in a group
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BucketGroupSettings {
    /// Maximum number of tokens (burst size)
    pub capacity: u32,
    /// Tokens added per second
    pub refill_rate: f64,
}

/// Upstream identity backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentitySettings {
    pub login_url: String,
    pub timeout_ms: u64,
}

/// In-process key-value store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvSettings {
    /// How often expired keys are swept, in seconds
    pub cleanup_cycle_secs: u64,
}

/// Bearer-token API clients
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Registered client app ids, sent in the `Client-Id` header
    pub client_ids: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "sessiongate".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            log_level: "info".to_string(),
            session: SessionSettings::default(),
            throttle: ThrottleSettings::default(),
            identity: IdentitySettings::default(),
            kv: KvSettings::default(),
            api: ApiSettings::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            encryption_key: String::new(),
            expire_in: 60 * 60 * 24, // 1 day
            expire_mode: ExpireMode::Sliding,
            login_path: "/login".to_string(),
            max_cnt_per_user: 0,
            store_timeout_ms: 2_000,
        }
    }
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        let mut groups = HashMap::new();
        groups.insert(
            "login".to_string(),
            BucketGroupSettings {
                capacity: 10,
                refill_rate: 0.2,
            },
        );
        groups.insert(
            "session".to_string(),
            BucketGroupSettings {
                capacity: 60,
                refill_rate: 1.0,
            },
        );
        Self {
            cleanup_cycle_secs: 60,
            cleanup_older_than_secs: 10 * 60,
            groups,
            trust_proxy_headers: false,
        }
    }
}

impl Default for KvSettings {
    fn default() -> Self {
        Self {
            cleanup_cycle_secs: 60,
        }
    }
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            login_url: "http://127.0.0.1:8080/auth/login".to_string(),
            timeout_ms: 5_000,
        }
    }
}

impl SessionSettings {
    pub fn expire_in(&self) -> Duration {
        Duration::from_secs(self.expire_in)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl ThrottleSettings {
    pub fn cleanup_cycle(&self) -> Duration {
        Duration::from_secs(self.cleanup_cycle_secs)
    }

    pub fn cleanup_older_than(&self) -> Duration {
        Duration::from_secs(self.cleanup_older_than_secs)
    }
}

impl KvSettings {
    pub fn cleanup_cycle(&self) -> Duration {
        Duration::from_secs(self.cleanup_cycle_secs)
    }
}

impl IdentitySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Settings {
    /// Load from `sessiongate.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from the given TOML file (if present) and the environment
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check every field that could make the service misbehave at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_name.trim().is_empty() {
            return Err(invalid("app_name must not be empty"));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(invalid(format!("unknown log_level '{}'", self.log_level)));
        }

        let session = &self.session;
        let key = STANDARD
            .decode(session.encryption_key.trim())
            .map_err(|e| invalid(format!("session.encryption_key is not base64: {e}")))?;
        if key.len() != 32 {
            return Err(invalid(format!(
                "session.encryption_key must decode to 32 bytes, got {}",
                key.len()
            )));
        }
        if session.expire_in == 0 {
            return Err(invalid("session.expire_in must be positive"));
        }
        if !session.login_path.starts_with('/') {
            return Err(invalid("session.login_path must start with '/'"));
        }
        if session.store_timeout_ms == 0 {
            return Err(invalid("session.store_timeout_ms must be positive"));
        }

        let throttle = &self.throttle;
        if throttle.cleanup_cycle_secs == 0 || throttle.cleanup_older_than_secs == 0 {
            return Err(invalid("throttle cleanup durations must be positive"));
        }
        for (group_id, group) in &throttle.groups {
            group
                .check()
                .map_err(|msg| invalid(format!("throttle group '{group_id}': {msg}")))?;
        }

        if self.identity.timeout_ms == 0 {
            return Err(invalid("identity.timeout_ms must be positive"));
        }
        if self.kv.cleanup_cycle_secs == 0 {
            return Err(invalid("kv.cleanup_cycle_secs must be positive"));
        }
        if self.api.client_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(invalid("api.client_ids must not contain empty ids"));
        }
        Ok(())
    }
}

impl BucketGroupSettings {
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be at least 1".to_string());
        }
        if !(self.refill_rate.is_finite() && self.refill_rate > 0.0) {
            return Err("refill_rate must be a positive number".to_string());
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    const TEST_KEY: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    fn valid_settings() -> Settings {
        let mut settings = Settings::default();
        settings.session.encryption_key = TEST_KEY.to_string();
        settings
    }

    #[test]
    fn test_settings_validation() {
        assert!(valid_settings().validate().is_ok());

        // Default has no key
        assert!(Settings::default().validate().is_err());

        let mut s = valid_settings();
        s.log_level = "loud".to_string();
        assert!(s.validate().is_err());

        let mut s = valid_settings();
        s.session.encryption_key = "c2hvcnQ=".to_string();
        assert!(s.validate().is_err());

        let mut s = valid_settings();
        s.session.expire_in = 0;
        assert!(s.validate().is_err());

        let mut s = valid_settings();
        s.session.login_path = "login".to_string();
        assert!(s.validate().is_err());

        let mut s = valid_settings();
        s.kv.cleanup_cycle_secs = 0;
        assert!(s.validate().is_err());

        let mut s = valid_settings();
        s.api.client_ids = vec!["web".to_string(), " ".to_string()];
        assert!(s.validate().is_err());

        let mut s = valid_settings();
        s.throttle.groups.get_mut("login").unwrap().capacity = 0;
        assert!(s.validate().is_err());

        let mut s = valid_settings();
        s.throttle.groups.get_mut("session").unwrap().refill_rate = f64::NAN;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_load_settings_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "gate.toml",
                &format!(
                    r#"
                    app_name = "shop"
                    log_level = "debug"

                    [session]
                    encryption_key = "{TEST_KEY}"
                    expire_in = 3600
                    expire_mode = "absolute"
                    max_cnt_per_user = 3

                    [throttle]
                    trust_proxy_headers = true

                    [throttle.groups.api]
                    capacity = 5
                    refill_rate = 0.5

                    [api]
                    client_ids = ["web", "cli"]
                    "#
                ),
            )?;
            jail.set_env("SESSIONGATE_LOG_LEVEL", "warn");
            jail.set_env("SESSIONGATE_SESSION__MAX_CNT_PER_USER", "2");

            let settings = Settings::load_from("gate.toml").expect("settings load");
            assert_eq!(settings.app_name, "shop");
            // Environment variable takes precedence
            assert_eq!(settings.log_level, "warn");
            assert_eq!(settings.session.max_cnt_per_user, 2);
            assert_eq!(settings.session.expire_mode, ExpireMode::Absolute);
            assert_eq!(settings.session.expire_in(), Duration::from_secs(3600));
            // Untouched sections keep their defaults
            assert_eq!(settings.session.login_path, "/login");
            assert_eq!(settings.kv.cleanup_cycle(), Duration::from_secs(60));
            assert!(settings.throttle.trust_proxy_headers);
            assert_eq!(settings.api.client_ids, vec!["web", "cli"]);
            assert_eq!(
                settings.throttle.groups["api"],
                BucketGroupSettings {
                    capacity: 5,
                    refill_rate: 0.5
                }
            );
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "gate.toml",
                r#"
                [session]
                encryption_key = "not base64 !!"
                "#,
            )?;
            assert!(matches!(
                Settings::load_from("gate.toml"),
                Err(ConfigError::Invalid(_))
            ));
            Ok(())
        });
    }
}
