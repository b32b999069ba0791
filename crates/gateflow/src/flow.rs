//! Entry point: start new flow sessions and resume existing ones.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{FlowError, Result};
use crate::gatekeeper::GateKeeper;
use crate::schema::{FlowSchema, GateDef};
use crate::store::{SessionData, SessionRecord, SessionStore};

/// Creates and resumes sessions of one flow schema.
#[derive(Debug, Clone)]
pub struct FlowController {
    schema: Arc<FlowSchema>,
    store: SessionStore,
}

impl FlowController {
    pub fn new(schema: FlowSchema, store: SessionStore) -> Self {
        Self {
            schema: Arc::new(schema),
            store,
        }
    }

    /// Build a schema from `(gate, allowed gates)` pairs in flow order.
    pub fn build_schema<I, G>(definition: I) -> Result<FlowSchema>
    where
        I: IntoIterator<Item = G>,
        G: Into<GateDef>,
    {
        FlowSchema::new(definition)
    }

    pub fn schema(&self) -> &FlowSchema {
        &self.schema
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Start a session at the first gate carrying `session` as its data.
    pub async fn create(&self, session: SessionData) -> Result<GateKeeper> {
        let key = self.store.create(&SessionRecord::new(session)).await?;
        info!(
            first_gate = %self.schema.gates()[0].name,
            "Flow session created"
        );
        Ok(self.bind(key))
    }

    /// Reattach to the session behind `key`.
    ///
    /// Fails with [`FlowError::KeyNotDefined`] for a blank key before the
    /// store is touched, and with [`FlowError::InvalidKey`] when no live
    /// session is behind it.
    pub async fn resume(&self, key: &str) -> Result<GateKeeper> {
        if key.trim().is_empty() {
            return Err(FlowError::KeyNotDefined);
        }
        if self.store.get(key).await?.is_none() {
            debug!("Resume refused: no session");
            return Err(FlowError::InvalidKey);
        }
        Ok(self.bind(key.to_string()))
    }

    fn bind(&self, key: String) -> GateKeeper {
        GateKeeper::new(key, Arc::clone(&self.schema), self.store.clone())
    }
}
