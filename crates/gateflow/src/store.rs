//! Session persistence behind public tokens.
//!
//! Every call resolves the caller's public key to the private backend key
//! through the configured [`KeyCodec`]; nothing maps one to the other
//! server-side. Records are stored as JSON with the configured TTL, which is
//! refreshed on every write.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::backend::{Expiry, KvBackend};
use crate::config::StoreConfig;
use crate::error::{FlowError, Result};
use crate::keys::{EncryptedKeys, KeyCodec};

/// Free-form data carried along with a session.
pub type SessionData = Map<String, Value>;

/// The persisted state of one flow session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub active_gate_index: usize,
    #[serde(default)]
    pub session: SessionData,
}

impl SessionRecord {
    /// Record positioned at the first gate.
    pub fn new(session: SessionData) -> Self {
        Self {
            active_gate_index: 0,
            session,
        }
    }
}

/// Handle to session records in a [`KvBackend`]. Cheap to clone.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn KvBackend>,
    keys: Arc<dyn KeyCodec>,
    ttl: Duration,
    expiry: Expiry,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Store using encrypted tokens derived from `config.secret`.
    pub fn new(backend: Arc<dyn KvBackend>, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let keys = EncryptedKeys::with_token_length(&config.secret, config.token_length)?;
        Self::with_codec(backend, Arc::new(keys), config.ttl())
    }

    /// Store using a caller-provided key indirection scheme.
    ///
    /// `ttl` must be at least one millisecond.
    pub fn with_codec(
        backend: Arc<dyn KvBackend>,
        keys: Arc<dyn KeyCodec>,
        ttl: Duration,
    ) -> Result<Self> {
        let expiry = Expiry::from_ttl(ttl).ok_or_else(|| {
            FlowError::invalid_config(format!("ttl {ttl:?} is shorter than one millisecond"))
        })?;
        Ok(Self {
            backend,
            keys,
            ttl,
            expiry,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist a new record and return its public key.
    pub async fn create(&self, record: &SessionRecord) -> Result<String> {
        let value = serde_json::to_string(record)?;
        let pair = self.keys.issue()?;
        self.backend
            .set(&pair.private_key, &value, self.expiry())
            .await?;
        debug!(ttl_secs = self.ttl.as_secs(), "Session record created");
        Ok(pair.public_key)
    }

    /// Fetch the record behind `public_key`.
    ///
    /// `Ok(None)` means the session does not exist: it was never created,
    /// was destroyed, or expired.
    pub async fn get(&self, public_key: &str) -> Result<Option<SessionRecord>> {
        let private_key = self.private_key(public_key)?;
        let value = match self.backend.get(&private_key).await? {
            Some(value) if !value.is_empty() => value,
            _ => {
                debug!("Session record not found");
                return Ok(None);
            }
        };
        Ok(Some(serde_json::from_str(&value)?))
    }

    /// Overwrite the record behind `public_key` and refresh its TTL.
    ///
    /// There is no compare-and-swap: concurrent writers to the same key race
    /// and the last write wins.
    pub async fn set(&self, public_key: &str, record: SessionRecord) -> Result<SessionRecord> {
        let private_key = self.private_key(public_key)?;
        let value = serde_json::to_string(&record)?;
        self.backend
            .set(&private_key, &value, self.expiry())
            .await?;
        debug!(
            active_gate_index = record.active_gate_index,
            "Session record updated"
        );
        Ok(record)
    }

    /// Delete the record behind `public_key`. Missing records are not an error.
    pub async fn destroy(&self, public_key: &str) -> Result<()> {
        let private_key = self.private_key(public_key)?;
        let removed = self.backend.del(&private_key).await?;
        debug!(removed, "Session record destroyed");
        Ok(())
    }

    /// Shut the backend down.
    pub async fn quit(&self) -> Result<()> {
        self.backend.quit().await?;
        Ok(())
    }

    fn private_key(&self, public_key: &str) -> Result<String> {
        self.keys.resolve(public_key).map_err(|err| {
            if matches!(err, FlowError::InvalidKey) {
                warn!("Rejected session token");
            }
            err
        })
    }

    fn expiry(&self) -> Expiry {
        self.expiry
    }
}
