//! Gatekeeper: the gate state machine over one session
//!
//! A [`GateKeeper`] holds nothing but a public key, the flow schema and a
//! store handle. Every method fetches the record afresh, so handles can be
//! dropped and recreated freely, including in another process.
//!
//! Live states are the schema positions `0..N`. [`GateKeeper::knock`] moves
//! to any gate named in the active position's allow-list, backwards
//! included. [`GateKeeper::next`] always moves forward by one and destroys
//! the session when it steps past the last gate.
//!
//! **Concurrency:** `knock`, `next` and `set_data` are read-modify-write
//! sequences with no versioning. Two handles on the same key that interleave
//! them race, and the later write silently replaces the earlier one.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{FlowError, Result, INVALID_GATE, INVALID_KEY};
use crate::schema::FlowSchema;
use crate::store::{SessionData, SessionRecord, SessionStore};

/// Outcome of [`GateKeeper::test`].
#[derive(Debug, Clone, PartialEq)]
pub struct GateTest {
    pub valid: bool,
    /// Reasons the gate was refused, in check order
    pub errors: Vec<String>,
    /// Session data at the time of the check; `None` if the session is gone
    pub session: Option<SessionData>,
}

/// Outcome of [`GateKeeper::next`].
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    /// True when the flow stepped past its last gate and was destroyed
    pub completed: bool,
    pub session: SessionData,
}

#[derive(Debug, Clone)]
pub struct GateKeeper {
    key: String,
    schema: Arc<FlowSchema>,
    store: SessionStore,
}

impl GateKeeper {
    pub fn new(key: impl Into<String>, schema: Arc<FlowSchema>, store: SessionStore) -> Self {
        Self {
            key: key.into(),
            schema,
            store,
        }
    }

    /// Public key of the session.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn schema(&self) -> &FlowSchema {
        &self.schema
    }

    /// Name of the currently active gate.
    pub async fn active_gate(&self) -> Result<String> {
        let record = self.record().await?;
        self.schema
            .gate(record.active_gate_index)
            .map(|gate| gate.name.clone())
            .ok_or_else(|| {
                FlowError::invalid_state(format!(
                    "active gate index {} is outside a {}-gate flow",
                    record.active_gate_index,
                    self.schema.len()
                ))
            })
    }

    /// Check whether `gate` could be knocked on now, without changing anything.
    pub async fn test(&self, gate: &str) -> Result<GateTest> {
        let (errors, record) = self.check(gate).await?;
        Ok(GateTest {
            valid: errors.is_empty(),
            errors,
            session: record.map(|record| record.session),
        })
    }

    /// Move the session to `gate` if the active position allows it.
    pub async fn knock(&self, gate: &str) -> Result<String> {
        let (errors, record) = self.check(gate).await?;
        let record = match record {
            Some(record) if errors.is_empty() => record,
            _ => {
                debug!(gate, ?errors, "Knock rejected");
                return Err(FlowError::Rejected(errors));
            }
        };
        let position = self.schema.position(gate).ok_or_else(|| {
            FlowError::invalid_state(format!("gate '{gate}' has no position in the flow"))
        })?;

        debug!(
            from = record.active_gate_index,
            to = position,
            gate,
            "Knock accepted"
        );
        self.store
            .set(
                &self.key,
                SessionRecord {
                    active_gate_index: position,
                    ..record
                },
            )
            .await?;
        Ok(gate.to_string())
    }

    /// Advance to the next position, ignoring allow-lists.
    ///
    /// Stepping past the last gate destroys the session and reports
    /// `completed` together with the data it held.
    pub async fn next(&self) -> Result<Advance> {
        let record = self.record().await?;
        let position = record.active_gate_index + 1;

        if position >= self.schema.len() {
            self.store.destroy(&self.key).await?;
            info!(gates = self.schema.len(), "Flow completed");
            return Ok(Advance {
                completed: true,
                session: record.session,
            });
        }

        let record = self
            .store
            .set(
                &self.key,
                SessionRecord {
                    active_gate_index: position,
                    ..record
                },
            )
            .await?;
        debug!(position, "Advanced to next gate");
        Ok(Advance {
            completed: false,
            session: record.session,
        })
    }

    pub async fn data(&self) -> Result<SessionData> {
        Ok(self.record().await?.session)
    }

    /// Session data deserialized into a caller type.
    pub async fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self.data().await?;
        Ok(serde_json::from_value(Value::Object(data))?)
    }

    /// Set one top-level field, keeping every other field as stored.
    pub async fn set_data(&self, field: &str, value: impl Into<Value>) -> Result<Value> {
        let mut record = self.record().await?;
        let value = value.into();
        record.session.insert(field.to_string(), value.clone());
        self.store.set(&self.key, record).await?;
        debug!(field, "Session field set");
        Ok(value)
    }

    /// Delete the session unconditionally.
    pub async fn destroy(&self) -> Result<()> {
        self.store.destroy(&self.key).await
    }

    async fn record(&self) -> Result<SessionRecord> {
        self.store.get(&self.key).await?.ok_or(FlowError::InvalidKey)
    }

    async fn check(&self, gate: &str) -> Result<(Vec<String>, Option<SessionRecord>)> {
        if gate.is_empty() {
            return Err(FlowError::GateNotDefined);
        }
        let record = match self.store.get(&self.key).await {
            Ok(record) => record,
            Err(FlowError::InvalidKey) => None,
            Err(err) => return Err(err),
        };

        let mut errors = Vec::new();
        match &record {
            None => errors.push(INVALID_KEY.to_string()),
            Some(record) if !self.schema.allows(record.active_gate_index, gate) => {
                errors.push(INVALID_GATE.to_string())
            }
            Some(_) => {}
        }
        Ok((errors, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::StoreConfig;
    use serde_json::json;

    fn setup() -> (Arc<FlowSchema>, SessionStore) {
        let schema = FlowSchema::new([
            ("start", vec!["start", "middle"]),
            ("middle", vec!["start", "middle", "end"]),
            ("end", vec!["end"]),
        ])
        .unwrap();
        let store = SessionStore::new(
            Arc::new(MemoryBackend::new()),
            &StoreConfig::new("gatekeeper-tests"),
        )
        .unwrap();
        (Arc::new(schema), store)
    }

    async fn open(session: Value) -> GateKeeper {
        let (schema, store) = setup();
        let Value::Object(session) = session else {
            panic!("session must be an object");
        };
        let key = store.create(&SessionRecord::new(session)).await.unwrap();
        GateKeeper::new(key, schema, store)
    }

    #[tokio::test]
    async fn test_starts_at_first_gate() {
        let gk = open(json!({})).await;
        assert_eq!(gk.active_gate().await.unwrap(), "start");
    }

    #[tokio::test]
    async fn test_empty_gate_is_hard_error() {
        let gk = open(json!({})).await;
        assert!(matches!(gk.test("").await, Err(FlowError::GateNotDefined)));
        assert!(matches!(gk.knock("").await, Err(FlowError::GateNotDefined)));
    }

    #[tokio::test]
    async fn test_reports_invalid_gate() {
        let gk = open(json!({"n": 1})).await;
        let result = gk.test("end").await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.errors, vec![INVALID_GATE.to_string()]);
        assert_eq!(result.session, Some(json!({"n": 1}).as_object().unwrap().clone()));

        let err = gk.knock("end").await.unwrap_err();
        assert_eq!(err.to_string(), INVALID_GATE);
        assert_eq!(gk.active_gate().await.unwrap(), "start");
    }

    #[tokio::test]
    async fn test_unknown_gate_is_invalid_gate() {
        let gk = open(json!({})).await;
        let result = gk.test("nowhere").await.unwrap();
        assert_eq!(result.errors, vec![INVALID_GATE.to_string()]);
    }

    #[tokio::test]
    async fn test_reports_invalid_key_after_destroy() {
        let gk = open(json!({})).await;
        gk.destroy().await.unwrap();

        let result = gk.test("start").await.unwrap();
        assert!(!result.valid);
        assert_eq!(result.errors, vec![INVALID_KEY.to_string()]);
        assert!(result.session.is_none());

        let err = gk.knock("start").await.unwrap_err();
        assert!(err.is_invalid_key());
        assert_eq!(err.to_string(), INVALID_KEY);
        assert!(matches!(gk.next().await, Err(FlowError::InvalidKey)));
        assert!(matches!(gk.data().await, Err(FlowError::InvalidKey)));
    }

    #[tokio::test]
    async fn test_tampered_key_reports_invalid_key() {
        let (schema, store) = setup();
        let gk = GateKeeper::new("not-a-token", schema, store);
        let result = gk.test("start").await.unwrap();
        assert_eq!(result.errors, vec![INVALID_KEY.to_string()]);
        assert!(matches!(gk.active_gate().await, Err(FlowError::InvalidKey)));
    }

    #[tokio::test]
    async fn test_knock_moves_and_regresses() {
        let gk = open(json!({})).await;
        assert_eq!(gk.knock("middle").await.unwrap(), "middle");
        assert_eq!(gk.active_gate().await.unwrap(), "middle");
        gk.knock("start").await.unwrap();
        assert_eq!(gk.active_gate().await.unwrap(), "start");
    }

    #[tokio::test]
    async fn test_next_ignores_allow_list_and_completes() {
        let gk = open(json!({"x": true})).await;
        let first = gk.next().await.unwrap();
        assert!(!first.completed);
        let second = gk.next().await.unwrap();
        assert!(!second.completed);
        assert_eq!(gk.active_gate().await.unwrap(), "end");

        gk.set_data("y", 2).await.unwrap();
        let last = gk.next().await.unwrap();
        assert!(last.completed);
        assert_eq!(last.session, json!({"x": true, "y": 2}).as_object().unwrap().clone());
        assert!(matches!(gk.active_gate().await, Err(FlowError::InvalidKey)));
    }

    #[tokio::test]
    async fn test_set_data_merges() {
        let gk = open(json!({"a": 1})).await;
        assert_eq!(gk.set_data("b", "two").await.unwrap(), json!("two"));
        gk.set_data("c", json!({"nested": [1, 2]})).await.unwrap();
        gk.set_data("a", 10).await.unwrap();
        let data = gk.data().await.unwrap();
        assert_eq!(
            Value::Object(data),
            json!({"a": 10, "b": "two", "c": {"nested": [1, 2]}})
        );
    }

    #[tokio::test]
    async fn test_data_as() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Signup {
            email: String,
            #[serde(default)]
            verified: bool,
        }

        let gk = open(json!({"email": "a@example.com"})).await;
        let signup: Signup = gk.data_as().await.unwrap();
        assert_eq!(
            signup,
            Signup {
                email: "a@example.com".to_string(),
                verified: false
            }
        );
    }

    #[tokio::test]
    async fn test_out_of_range_record_is_invalid_state() {
        let (schema, store) = setup();
        let key = store
            .create(&SessionRecord {
                active_gate_index: 7,
                session: SessionData::new(),
            })
            .await
            .unwrap();
        let gk = GateKeeper::new(key, schema, store);
        assert!(matches!(gk.active_gate().await, Err(FlowError::InvalidState(_))));
        let result = gk.test("start").await.unwrap();
        assert_eq!(result.errors, vec![INVALID_GATE.to_string()]);
    }
}
