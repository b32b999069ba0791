//! Public/private key indirection
//!
//! The backend key of a session (the private key) never leaves the process.
//! Callers only ever see a public key derived from it. No mapping table is
//! kept: [`KeyCodec::resolve`] recomputes the private key from the public one
//! on every access.

use std::fmt;

use crate::cipher::{Cipher, DEFAULT_TOKEN_LEN};
use crate::error::{FlowError, Result};

/// A freshly issued key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Converts between caller-visible tokens and backend keys.
pub trait KeyCodec: Send + Sync {
    /// Issue a new private key together with the token that resolves to it.
    fn issue(&self) -> Result<KeyPair>;

    /// Recover the private key behind `public_key`.
    ///
    /// Any token this codec did not issue must fail with
    /// [`FlowError::InvalidKey`].
    fn resolve(&self, public_key: &str) -> Result<String>;
}

/// [`KeyCodec`] that encrypts a random private key to form the public key.
#[derive(Debug, Clone)]
pub struct EncryptedKeys {
    cipher: Cipher,
    token_length: usize,
}

impl EncryptedKeys {
    pub fn new(secret: &str) -> Result<Self> {
        Self::with_token_length(secret, DEFAULT_TOKEN_LEN)
    }

    pub fn with_token_length(secret: &str, token_length: usize) -> Result<Self> {
        if token_length == 0 {
            return Err(FlowError::invalid_config("token length must be positive"));
        }
        Ok(Self {
            cipher: Cipher::new(secret)?,
            token_length,
        })
    }

    pub fn token_length(&self) -> usize {
        self.token_length
    }

    fn looks_issued(&self, private_key: &str) -> bool {
        private_key.len() == self.token_length
            && private_key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl KeyCodec for EncryptedKeys {
    fn issue(&self) -> Result<KeyPair> {
        let private_key = self.cipher.random(self.token_length)?;
        let public_key = self.cipher.encrypt(&private_key)?;
        Ok(KeyPair {
            private_key,
            public_key,
        })
    }

    fn resolve(&self, public_key: &str) -> Result<String> {
        let private_key = match self.cipher.decrypt(public_key) {
            Ok(private_key) => private_key,
            Err(FlowError::EmptyValue) => return Err(FlowError::InvalidKey),
            Err(err) => return Err(err),
        };
        if !self.looks_issued(&private_key) {
            return Err(FlowError::InvalidKey);
        }
        Ok(private_key)
    }
}
