// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const SESSION_CREATED: &str = "session.created";
pub const SESSION_EVICTED: &str = "session.evicted";
pub const SESSION_DELETED: &str = "session.deleted";
pub const SESSION_RENEW_FAILED: &str = "session.renew_failed";
pub const THROTTLE_DENIED: &str = "throttle.denied";
pub const THROTTLE_SWEPT: &str = "throttle.swept";
pub const SESSION_INDEX_PRUNED: &str = "session.index_pruned";
pub const KV_EXPIRED_SWEPT: &str = "kv.expired_swept";
pub const ACCESS_TOKEN_REJECTED: &str = "access_token.rejected";
