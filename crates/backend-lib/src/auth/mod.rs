// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Authentication module.

pub mod access_token;
pub mod identity;
pub mod locks;
pub mod session;
pub mod token_generator;

pub use access_token::AccessTokens;
pub use identity::{HttpIdentityBackend, IdentityBackend};
pub use locks::UserLocks;
pub use session::SessionManager;
pub use token_generator::generate_session_id;
