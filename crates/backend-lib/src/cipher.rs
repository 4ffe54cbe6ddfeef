// ============================
// crates/backend-lib/src/cipher.rs
// ============================
/** Authenticated encryption of session identifiers carried in cookies.
Tokens are `base64url(nonce || ciphertext || tag)` without padding, so the
output only uses `[A-Za-z0-9_-]` and can be placed in a cookie value as is.
Any tampering, truncation or use of another key makes decryption fail. */
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM cipher keyed once at startup
#[derive(Clone)]
pub struct CookieCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for CookieCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieCipher").finish_non_exhaustive()
    }
}

impl CookieCipher {
    /// Build from raw key bytes
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Build from the standard base64 form used in configuration
    pub fn from_base64_key(key_b64: &str) -> Result<Self, CryptoError> {
        let key = Zeroizing::new(
            STANDARD
                .decode(key_b64.trim())
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?,
        );
        Self::new(&key)
    }

    /// Encrypt and encode to a cookie-safe token
    pub fn encrypt_encode(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Decode and decrypt a token produced by [`Self::encrypt_encode`]
    pub fn decode_decrypt(&self, token: &str) -> Result<Vec<u8>, CryptoError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CryptoError::Decrypt)?;
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Decrypt);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> CookieCipher {
        CookieCipher::new(&[7u8; KEY_LEN]).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        let inputs: [&[u8]; 3] = [b"", b"0123456789abcdef0123456789abcdef", &[0, 255, 10, 13]];
        for plaintext in inputs {
            let token = cipher.encrypt_encode(plaintext).unwrap();
            assert_eq!(cipher.decode_decrypt(&token).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_token_is_cookie_safe_and_randomized() {
        let cipher = cipher();
        let a = cipher.encrypt_encode(b"session").unwrap();
        let b = cipher.encrypt_encode(b"session").unwrap();
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_every_bit_flip_is_rejected() {
        let cipher = cipher();
        let token = cipher.encrypt_encode(b"4f1c2a9e0b7d4e8f9a1b2c3d4e5f6a7b").unwrap();
        let sealed = URL_SAFE_NO_PAD.decode(&token).unwrap();

        for byte in 0..sealed.len() {
            for bit in 0..8 {
                let mut mutated = sealed.clone();
                mutated[byte] ^= 1 << bit;
                let forged = URL_SAFE_NO_PAD.encode(&mutated);
                assert_eq!(
                    cipher.decode_decrypt(&forged),
                    Err(CryptoError::Decrypt),
                    "flip of bit {bit} in byte {byte} was accepted"
                );
            }
        }
    }

    #[test]
    fn test_truncated_and_garbage_tokens_are_rejected() {
        let cipher = cipher();
        let token = cipher.encrypt_encode(b"session").unwrap();
        assert!(cipher.decode_decrypt(&token[..token.len() - 2]).is_err());
        assert!(cipher.decode_decrypt("").is_err());
        assert!(cipher.decode_decrypt("not*base64").is_err());
    }

    #[test]
    fn test_other_key_is_rejected() {
        let token = cipher().encrypt_encode(b"session").unwrap();
        let other = CookieCipher::new(&[8u8; KEY_LEN]).unwrap();
        assert_eq!(other.decode_decrypt(&token), Err(CryptoError::Decrypt));
    }

    #[test]
    fn test_key_validation() {
        assert!(CookieCipher::new(&[0u8; 16]).is_err());
        assert!(CookieCipher::from_base64_key("%%%").is_err());
        assert!(CookieCipher::from_base64_key(&STANDARD.encode([1u8; KEY_LEN])).is_ok());
    }
}
