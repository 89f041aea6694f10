//! Domain types for the rollout record store.
//!
//! A [`RolloutRecord`] accumulates the pod lifecycle history of one rollout
//! identity. Records are serialized to/from JSON for storage in redb.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable key identifying one rollout's tracked record.
pub type Identity = String;

/// Current schema version written into new records.
pub const SCHEMA_VERSION: u32 = 1;

/// Per-rollout lifecycle counter record.
///
/// Counters are monotonic within a record's lifetime; `attributes` is fixed
/// at first creation and never overwritten by later folds. A record dies
/// only through explicit deletion by the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutRecord {
    /// Sanitized identity string; immutable after creation.
    pub identity: Identity,
    /// Rollout-generation fingerprint (pod template hash). Last-writer-wins.
    pub revision_hash: String,
    /// Name of the most recently observed pod. Last-writer-wins.
    pub last_pod_name: String,
    /// Number of create notifications folded in.
    pub created_count: u64,
    /// Number of delete notifications folded in.
    pub deleted_count: u64,
    /// Unix timestamp (seconds) of the most recent fold. Never decreases.
    pub last_updated: u64,
    /// Attributes captured at first creation of the record.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    /// Record format version, for forward compatibility.
    #[serde(default)]
    pub schema_version: u32,
}

/// Typed attribute value captured from notification metadata.
///
/// Values outside this union (arrays, objects) are captured as their JSON
/// string rendering rather than interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Num(f64),
    Str(String),
}

impl AttrValue {
    /// Coerce an arbitrary JSON value into the attribute union.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => AttrValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => AttrValue::Num(f),
                None => AttrValue::Str(n.to_string()),
            },
            serde_json::Value::String(s) => AttrValue::Str(s.clone()),
            other => AttrValue::Str(other.to_string()),
        }
    }

    /// Render the value as a plain string (for environment templating).
    pub fn render(&self) -> String {
        match self {
            AttrValue::Bool(b) => b.to_string(),
            AttrValue::Num(n) => n.to_string(),
            AttrValue::Str(s) => s.clone(),
        }
    }
}
