// crates/backend-lib/src/middleware/mod.rs

//! Middleware guarding routes with cookie sessions, bearer tokens, client
//! ids and token buckets.

pub mod api;
pub mod rate_limit;
pub mod session;

pub use api::{require_access_token, require_client_id, AccessTokenContext, ClientGate, ClientId};
pub use rate_limit::{throttle_ip, throttle_session, ThrottleGroup};
pub use session::{require_session, SessionContext};
