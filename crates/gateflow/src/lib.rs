//! Gate Flow
//!
//! Drives multi-step, schema-defined flows (register, send code, verify
//! code, complete) whose progress lives in an external TTL-backed key-value
//! store.
//!
//! - **Cipher**: AES-256-CTR token encryption and random key generation
//! - **Keys**: public token ↔ private backend key indirection
//! - **Backend**: the key-value capability the store runs on
//! - **Store**: session record persistence
//! - **Gatekeeper**: the knock / next / test state machine over one session
//! - **Flow**: creating and resuming sessions
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gateflow::{FlowController, MemoryBackend, SessionStore, StoreConfig};
//!
//! let store = SessionStore::new(Arc::new(MemoryBackend::new()), &StoreConfig::new(secret))?;
//! let schema = FlowController::build_schema([
//!     ("register", vec!["register"]),
//!     ("verify", vec!["register", "verify"]),
//! ])?;
//! let flow = FlowController::new(schema, store);
//!
//! let gate = flow.create(Default::default()).await?;
//! let token = gate.key().to_string();
//! // later, possibly in another process
//! let gate = flow.resume(&token).await?;
//! gate.knock("register").await?;
//! ```

pub mod backend;
pub mod cipher;
pub mod config;
mod error;
pub mod flow;
pub mod gatekeeper;
pub mod keys;
pub mod schema;
pub mod store;

pub use backend::{BackendError, Expiry, KvBackend, MemoryBackend};
pub use cipher::Cipher;
pub use config::StoreConfig;
pub use error::{FlowError, Result, INVALID_GATE, INVALID_KEY};
pub use flow::FlowController;
pub use gatekeeper::{Advance, GateKeeper, GateTest};
pub use keys::{EncryptedKeys, KeyCodec, KeyPair};
pub use schema::{FlowSchema, GateDef};
pub use store::{SessionData, SessionRecord, SessionStore};
