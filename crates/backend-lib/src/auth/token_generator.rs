// ============================
// crates/backend-lib/src/auth/token_generator.rs
// ============================
/** Session identifier generation.
Identifiers carry 128 bits from a cryptographically secure generator and
are hex-encoded, giving 32 lowercase characters. Uniqueness is
probabilistic: the store is never checked for collisions. */
use rand::RngCore;

/// Session id size in bytes (16 bytes = 128 bits of entropy)
pub const SESSION_ID_BYTES: usize = 16;

/// Generate a fresh session identifier
pub fn generate_session_id() -> String {
    let mut buffer = [0u8; SESSION_ID_BYTES];
    rand::rng().fill_bytes(&mut buffer);
    hex::encode(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_session_id_shape() {
        let id = generate_session_id();
        assert_eq!(id.len(), SESSION_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_session_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_session_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
