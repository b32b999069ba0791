//! Symmetric cipher for session tokens
//!
//! AES-256-CTR keyed by the SHA-256 digest of a caller-supplied secret.
//! Every encryption draws a fresh 16-byte IV, so equal plaintexts never
//! produce equal tokens. Ciphertext layout is `hex(iv) || hex(body)`.
//!
//! Decryption failures are collapsed into [`FlowError::InvalidKey`]: a
//! truncated token, a foreign token and an expired session all look the same
//! to the caller.

use std::fmt;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{KeyIvInit, StreamCipher};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{FlowError, Result};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// IV size in bytes.
pub const IV_LEN: usize = 16;

/// Default length of tokens produced by [`Cipher::random`].
pub const DEFAULT_TOKEN_LEN: usize = 48;

const IV_HEX_LEN: usize = IV_LEN * 2;

#[derive(Clone)]
pub struct Cipher {
    key: [u8; 32],
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").field("key", &"<redacted>").finish()
    }
}

impl Cipher {
    /// Derive the cipher key from `secret`. The secret must not be empty.
    pub fn new(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(FlowError::invalid_config("cipher secret is empty"));
        }
        Ok(Self {
            key: Sha256::digest(secret.as_bytes()).into(),
        })
    }

    /// Random lowercase hex string of exactly `length` characters.
    pub fn random(&self, length: usize) -> Result<String> {
        let mut token = hex::encode(random_bytes(length.div_ceil(2))?);
        token.truncate(length);
        Ok(token)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Err(FlowError::EmptyValue);
        }
        let iv: [u8; IV_LEN] = random_bytes(IV_LEN)?
            .try_into()
            .map_err(|_| FlowError::Entropy("short IV".to_string()))?;

        let mut body = plaintext.as_bytes().to_vec();
        self.keystream(&iv).apply_keystream(&mut body);

        let mut out = String::with_capacity(IV_HEX_LEN + body.len() * 2);
        out.push_str(&hex::encode(iv));
        out.push_str(&hex::encode(body));
        Ok(out)
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        if ciphertext.is_empty() {
            return Err(FlowError::EmptyValue);
        }
        if ciphertext.len() <= IV_HEX_LEN || !ciphertext.is_ascii() {
            return Err(FlowError::InvalidKey);
        }
        let (iv_hex, body_hex) = ciphertext.split_at(IV_HEX_LEN);

        let mut iv = [0u8; IV_LEN];
        hex::decode_to_slice(iv_hex, &mut iv).map_err(|_| FlowError::InvalidKey)?;
        let mut body = hex::decode(body_hex).map_err(|_| FlowError::InvalidKey)?;

        self.keystream(&iv).apply_keystream(&mut body);
        String::from_utf8(body).map_err(|_| FlowError::InvalidKey)
    }

    fn keystream(&self, iv: &[u8; IV_LEN]) -> Aes256Ctr {
        Aes256Ctr::new(
            GenericArray::from_slice(&self.key),
            GenericArray::from_slice(iv),
        )
    }
}

fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| FlowError::Entropy(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> Cipher {
        Cipher::new("apples").unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        for plaintext in ["a", "hello world", "0123456789abcdef0123456789abcdef", "ünïcødé"] {
            let encrypted = cipher.encrypt(plaintext).unwrap();
            assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let cipher = cipher();
        let a = cipher.encrypt("same").unwrap();
        let b = cipher.encrypt("same").unwrap();
        assert_ne!(a, b);
        assert_ne!(a[..IV_HEX_LEN], b[..IV_HEX_LEN]);
    }

    #[test]
    fn test_ciphertext_layout() {
        let encrypted = cipher().encrypt("abcd").unwrap();
        assert_eq!(encrypted.len(), IV_HEX_LEN + 8);
        assert!(encrypted.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_empty_input_is_validation_error() {
        let cipher = cipher();
        assert!(matches!(cipher.encrypt(""), Err(FlowError::EmptyValue)));
        assert!(matches!(cipher.decrypt(""), Err(FlowError::EmptyValue)));
    }

    #[test]
    fn test_malformed_ciphertext_is_invalid_key() {
        let cipher = cipher();
        let valid = cipher.encrypt("token").unwrap();
        let cases = [
            "complete".to_string(),
            "zz".repeat(IV_LEN + 4),
            valid[..IV_HEX_LEN].to_string(),
            format!("{}0", valid),
            format!("{}é", &valid[..IV_HEX_LEN]),
        ];
        for case in cases {
            assert!(
                matches!(cipher.decrypt(&case), Err(FlowError::InvalidKey)),
                "expected invalid key for {case:?}"
            );
        }
    }

    #[test]
    fn test_wrong_secret_does_not_recover_plaintext() {
        let encrypted = cipher().encrypt("private-key").unwrap();
        let other = Cipher::new("pears").unwrap();
        match other.decrypt(&encrypted) {
            Ok(plaintext) => assert_ne!(plaintext, "private-key"),
            Err(err) => assert!(matches!(err, FlowError::InvalidKey)),
        }
    }

    #[test]
    fn test_random_length_and_alphabet() {
        let cipher = cipher();
        for len in [0, 1, 15, 16, DEFAULT_TOKEN_LEN, 97] {
            let token = cipher.random(len).unwrap();
            assert_eq!(token.len(), len);
            assert!(token.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
        assert_ne!(cipher.random(48).unwrap(), cipher.random(48).unwrap());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(Cipher::new(""), Err(FlowError::InvalidConfig(_))));
    }

    #[test]
    fn test_debug_redacts_key() {
        let rendered = format!("{:?}", cipher());
        assert!(rendered.contains("<redacted>"));
    }
}
