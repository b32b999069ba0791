//! Session store configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::cipher::DEFAULT_TOKEN_LEN;
use crate::error::{FlowError, Result};

pub const DEFAULT_TTL_SECS: u64 = 60 * 60;

/// Longest session lifetime accepted (ten years).
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Shortest private key accepted; anything below is trivially guessable.
pub const MIN_TOKEN_LEN: usize = 16;

pub const ENV_SECRET: &str = "GATEFLOW_SECRET";
pub const ENV_TTL_SECS: &str = "GATEFLOW_TTL_SECS";
pub const ENV_TOKEN_LENGTH: &str = "GATEFLOW_TOKEN_LENGTH";

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Secret the token cipher key is derived from
    pub secret: String,
    /// Session lifetime, refreshed on every write
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Length of generated backend keys, in hex characters
    #[serde(default = "default_token_length")]
    pub token_length: usize,
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_token_length() -> usize {
    DEFAULT_TOKEN_LEN
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .field("token_length", &self.token_length)
            .finish()
    }
}

impl StoreConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl_secs: DEFAULT_TTL_SECS,
            token_length: DEFAULT_TOKEN_LEN,
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn with_token_length(mut self, token_length: usize) -> Self {
        self.token_length = token_length;
        self
    }

    /// Build from `GATEFLOW_*` environment variables.
    ///
    /// `GATEFLOW_SECRET` is required; TTL and token length fall back to the
    /// defaults when unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let secret = lookup(ENV_SECRET)
            .ok_or_else(|| FlowError::invalid_config(format!("{ENV_SECRET} is not set")))?;
        let mut config = Self::new(secret);
        if let Some(raw) = lookup(ENV_TTL_SECS) {
            config.ttl_secs = parse_var(ENV_TTL_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TOKEN_LENGTH) {
            config.token_length = parse_var(ENV_TOKEN_LENGTH, &raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.secret.is_empty() {
            return Err(FlowError::invalid_config("secret is empty"));
        }
        if self.ttl_secs == 0 {
            return Err(FlowError::invalid_config("ttl_secs must be positive"));
        }
        if self.ttl_secs > MAX_TTL_SECS {
            return Err(FlowError::invalid_config(format!(
                "ttl_secs must be at most {MAX_TTL_SECS}, got {}",
                self.ttl_secs
            )));
        }
        if self.token_length < MIN_TOKEN_LEN {
            return Err(FlowError::invalid_config(format!(
                "token_length must be at least {MIN_TOKEN_LEN}, got {}",
                self.token_length
            )));
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| FlowError::invalid_config(format!("{name} is not a valid number: {raw:?}")))
}
