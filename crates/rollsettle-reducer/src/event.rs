//! Notification wire types.
//!
//! The ingress boundary between the external watch subsystem and the
//! reducer. Notifications carry the rollout identity (derived from an
//! application label), the lifecycle kind, and free-form metadata.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::reducer::ReduceError;

/// Maximum length of a sanitized identity (label-value convention).
const MAX_IDENTITY_LEN: usize = 63;

/// Lifecycle notification kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Create,
    Delete,
}

/// One pod lifecycle notification as delivered by the watch subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodNotification {
    /// Rollout identity (the app label value).
    pub identity: String,
    pub kind: EventKind,
    /// Pod template hash, when the watch surfaced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_hash: Option<String>,
    /// Name of the pod this notification is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    /// Free-form metadata (pod annotations); capture is driven by config.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PodNotification {
    /// Parse and validate a notification from its JSON wire form.
    pub fn parse(bytes: &[u8]) -> Result<Self, ReduceError> {
        let notification: Self =
            serde_json::from_slice(bytes).map_err(|e| ReduceError::Malformed(e.to_string()))?;
        notification.validate()?;
        Ok(notification)
    }

    /// Reject notifications that cannot be folded.
    pub fn validate(&self) -> Result<(), ReduceError> {
        if sanitize_identity(&self.identity).is_empty() {
            return Err(ReduceError::Malformed(
                "notification has no usable identity".to_string(),
            ));
        }
        Ok(())
    }
}

/// Normalize a raw identity into the storage key form.
///
/// Lowercases, maps anything outside `[a-z0-9._-]` to `-`, strips leading
/// and trailing separators, and caps the length at the label-value limit.
pub fn sanitize_identity(raw: &str) -> String {
    let mapped: String = raw
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches(|c| c == '-' || c == '.' || c == '_');
    trimmed.chars().take(MAX_IDENTITY_LEN).collect()
}
