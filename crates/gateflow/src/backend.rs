//! Key-value backend capability.
//!
//! The session store only needs four commands from its backend, modelled on
//! Redis: `SET key value EX|PX ttl`, `GET`, `DEL` and `QUIT`. Values are
//! opaque text. [`MemoryBackend`] is an in-process implementation with real
//! TTL expiry, used by the test suite and by embedders that do not need a
//! shared store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Errors from backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend connection error: {0}")]
    Connection(String),

    #[error("Backend command failed: {0}")]
    Command(String),

    #[error("Backend is closed")]
    Closed,
}

/// Expiry attached to a `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Whole seconds (Redis `EX`)
    Seconds(u64),
    /// Milliseconds (Redis `PX`)
    Millis(u64),
}

impl Expiry {
    /// Redis mode token for this expiry.
    pub fn mode(&self) -> &'static str {
        match self {
            Expiry::Seconds(_) => "EX",
            Expiry::Millis(_) => "PX",
        }
    }

    /// Numeric argument that goes with [`Expiry::mode`].
    pub fn amount(&self) -> u64 {
        match self {
            Expiry::Seconds(n) | Expiry::Millis(n) => *n,
        }
    }

    pub fn as_duration(&self) -> Duration {
        match self {
            Expiry::Seconds(n) => Duration::from_secs(*n),
            Expiry::Millis(n) => Duration::from_millis(*n),
        }
    }
}

impl Expiry {
    /// Expiry for a TTL: whole seconds as `EX`, anything finer as `PX`.
    ///
    /// `None` when the TTL is under one millisecond.
    pub fn from_ttl(ttl: Duration) -> Option<Self> {
        if ttl.subsec_nanos() == 0 {
            return (ttl.as_secs() > 0).then_some(Expiry::Seconds(ttl.as_secs()));
        }
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        (millis > 0).then_some(Expiry::Millis(millis))
    }
}

/// Storage capability used by the session store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Store `value` under `key`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, expiry: Expiry) -> Result<(), BackendError>;

    /// Fetch the value under `key`; `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Delete `key`, returning how many entries were removed.
    async fn del(&self, key: &str) -> Result<u64, BackendError>;

    /// Graceful shutdown.
    async fn quit(&self) -> Result<(), BackendError>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, Entry>,
    closed: bool,
}

/// In-memory [`KvBackend`] with lazy TTL expiry.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let state = self.state.lock().await;
        state.entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let before = state.entries.len();
        state.entries.retain(|_, entry| entry.is_live(now));
        let purged = before - state.entries.len();
        if purged > 0 {
            debug!(purged, "Purged expired entries");
        }
        purged
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn set(&self, key: &str, value: &str, expiry: Expiry) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BackendError::Closed);
        }
        let expires_at = Instant::now()
            .checked_add(expiry.as_duration())
            .ok_or_else(|| {
                BackendError::Command(format!(
                    "expiry {} {} is out of range",
                    expiry.mode(),
                    expiry.amount()
                ))
            })?;
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BackendError::Closed);
        }
        match state.entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                state.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<u64, BackendError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(BackendError::Closed);
        }
        match state.entries.remove(key) {
            Some(entry) if entry.is_live(now) => Ok(1),
            _ => Ok(0),
        }
    }

    async fn quit(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.entries.clear();
        Ok(())
    }
}
