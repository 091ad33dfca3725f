//! Opaque computation graph handed from the caller to the cluster.
//!
//! The body is produced by an external planner and never interpreted
//! here. The only structure GridJob relies on is the set of resource
//! names the graph references, which the cluster checks against the
//! deployed bundle before accepting the graph.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dag {
    body: serde_json::Value,
    #[serde(default)]
    references: BTreeSet<String>,
}

impl Dag {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            body,
            references: BTreeSet::new(),
        }
    }

    /// Encode any serializable planner output as a graph body.
    pub fn from_serializable<T: Serialize>(plan: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_value(plan)?))
    }

    /// Declare that the graph needs the deployed resource `name`.
    pub fn referencing(mut self, name: &str) -> Self {
        self.references.insert(name.to_string());
        self
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    pub fn references(&self) -> &BTreeSet<String> {
        &self.references
    }

    /// Size of the serialized body in bytes.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.body).map(|v| v.len()).unwrap_or(0)
    }
}
