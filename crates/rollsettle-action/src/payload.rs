//! Action request payload and environment templating.
//!
//! The core's obligation to the task runner is a mapping from string to
//! primitive value plus the rollout identity. Attributes are stringified
//! into environment variable pairs; `APP_NAME` carries the identity and is
//! always appended last.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rollsettle_state::AttrValue;

/// The data contract handed to the task runner when a rollout settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// The settled rollout's identity.
    pub identity: String,
    /// Attributes captured at first creation of the record.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
}

impl ActionRequest {
    /// Render the request as environment variable pairs.
    ///
    /// Attributes come first (in key order), then `APP_NAME=<identity>`.
    pub fn env_vars(&self) -> Vec<EnvVar> {
        let mut vars: Vec<EnvVar> = self
            .attributes
            .iter()
            .map(|(name, value)| EnvVar::literal(name, value.render()))
            .collect();
        vars.push(EnvVar::literal("APP_NAME", self.identity.clone()));
        vars
    }
}

/// One environment variable in the job payload.
///
/// Either a literal value or a secret reference resolved by the task runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretRef>,
}

impl EnvVar {
    /// A literal name=value pair.
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            secret: None,
        }
    }
}

/// Reference to a key inside a named secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    pub key: String,
}
