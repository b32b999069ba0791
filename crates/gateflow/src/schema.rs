//! Flow schemas: ordered gates and their per-position allow-lists.

use std::collections::{HashMap, HashSet};

use crate::error::{FlowError, Result};

/// One position in a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDef {
    pub name: String,
    /// Gates that may be knocked on while this gate is active
    pub allowed: Vec<String>,
}

impl GateDef {
    pub fn new<N, I, A>(name: N, allowed: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            name: name.into(),
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl<N, I, A> From<(N, I)> for GateDef
where
    N: Into<String>,
    I: IntoIterator<Item = A>,
    A: Into<String>,
{
    fn from((name, allowed): (N, I)) -> Self {
        Self::new(name, allowed)
    }
}

/// Immutable, validated flow schema with name lookups built once.
#[derive(Debug, Clone)]
pub struct FlowSchema {
    gates: Vec<GateDef>,
    allowed: Vec<HashSet<String>>,
    index: HashMap<String, usize>,
}

impl FlowSchema {
    /// Build a schema from gate definitions, in flow order.
    ///
    /// Rejects an empty flow, empty gate names, and allow-lists naming a gate
    /// the flow never declares. A name declared twice resolves to its first
    /// position.
    pub fn new<I, G>(definition: I) -> Result<Self>
    where
        I: IntoIterator<Item = G>,
        G: Into<GateDef>,
    {
        let gates: Vec<GateDef> = definition.into_iter().map(Into::into).collect();
        if gates.is_empty() {
            return Err(FlowError::invalid_schema("flow has no gates"));
        }

        let mut index = HashMap::with_capacity(gates.len());
        for (position, gate) in gates.iter().enumerate() {
            if gate.name.is_empty() {
                return Err(FlowError::invalid_schema(format!(
                    "gate at position {position} has an empty name"
                )));
            }
            index.entry(gate.name.clone()).or_insert(position);
        }

        let mut allowed = Vec::with_capacity(gates.len());
        for gate in &gates {
            if let Some(unknown) = gate.allowed.iter().find(|name| !index.contains_key(*name)) {
                return Err(FlowError::invalid_schema(format!(
                    "gate '{}' allows undeclared gate '{}'",
                    gate.name, unknown
                )));
            }
            allowed.push(gate.allowed.iter().cloned().collect());
        }

        Ok(Self {
            gates,
            allowed,
            index,
        })
    }

    /// Gate definitions exactly as supplied.
    pub fn gates(&self) -> &[GateDef] {
        &self.gates
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    pub fn gate(&self, position: usize) -> Option<&GateDef> {
        self.gates.get(position)
    }

    /// Declared position of `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Whether `gate` may be knocked on while `position` is active.
    pub fn allows(&self, position: usize, gate: &str) -> bool {
        self.allowed
            .get(position)
            .is_some_and(|allowed| allowed.contains(gate))
    }
}
